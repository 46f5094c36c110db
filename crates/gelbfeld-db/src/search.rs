use tracing::debug;

use crate::models::SearchRow;
use crate::relationships::query_status_between;
use crate::{Database, StoreError};

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

impl Database {
    /// Identities whose username or email contains `query` (case-insensitive),
    /// excluding the caller, each annotated with its relationship to the
    /// caller. A blank query matches nobody.
    pub fn search_identities(
        &self,
        caller_id: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SearchRow>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(vec![]);
        }

        let results = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut stmt = tx.prepare(
                "SELECT id, username, email FROM identities
                 WHERE id <> ?1
                   AND (instr(lower(username), lower(?2)) > 0 OR instr(lower(email), lower(?2)) > 0)
                 ORDER BY username
                 LIMIT ?3",
            )?;
            let candidates = stmt
                .query_map(rusqlite::params![caller_id, query, limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);

            let mut results = Vec::with_capacity(candidates.len());
            for (id, username, email) in candidates {
                let status = query_status_between(&tx, caller_id, &id)?;
                results.push(SearchRow { username, email, status });
            }
            tx.finish()?;
            Ok(results)
        })?;

        debug!("Search '{}' by {} matched {} identities", query, caller_id, results.len());
        Ok(results)
    }
}
