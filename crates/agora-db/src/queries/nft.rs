use anyhow::Result;
use rusqlite::params;

use super::OptionalExt;
use crate::Database;
use crate::models::NftVisibilityRow;

impl Database {
    pub fn set_nft_visibility(
        &self,
        contract: &str,
        token_id: &str,
        hidden: bool,
        featured: bool,
        updated_by: &str,
        now: i64,
    ) -> Result<NftVisibilityRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO nft_visibility (contract, token_id, hidden, featured, updated_by, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (contract, token_id) DO UPDATE SET
                     hidden = excluded.hidden,
                     featured = excluded.featured,
                     updated_by = excluded.updated_by,
                     updated_at = excluded.updated_at",
                params![contract, token_id, hidden, featured, updated_by, now],
            )?;
            Ok(NftVisibilityRow {
                contract: contract.to_string(),
                token_id: token_id.to_string(),
                hidden,
                featured,
                updated_by: updated_by.to_string(),
                updated_at: now,
            })
        })
    }

    pub fn get_nft_visibility(&self, contract: &str, token_id: &str) -> Result<Option<NftVisibilityRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT contract, token_id, hidden, featured, updated_by, updated_at
                 FROM nft_visibility WHERE contract = ?1 AND token_id = ?2",
                params![contract, token_id],
                map_visibility,
            )
            .optional()
        })
    }

    pub fn list_nft_visibility(&self, contract: Option<&str>) -> Result<Vec<NftVisibilityRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT contract, token_id, hidden, featured, updated_by, updated_at
                 FROM nft_visibility
                 WHERE (?1 IS NULL OR contract = ?1)
                 ORDER BY contract, updated_at DESC",
            )?;
            let rows = stmt
                .query_map([contract], map_visibility)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn hidden_nft_tokens(&self, contract: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT token_id FROM nft_visibility WHERE contract = ?1 AND hidden = 1 ORDER BY token_id",
            )?;
            let ids = stmt
                .query_map([contract], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    /// Featured tokens that are not hidden.
    pub fn featured_nft_tokens(&self, contract: Option<&str>) -> Result<Vec<NftVisibilityRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT contract, token_id, hidden, featured, updated_by, updated_at
                 FROM nft_visibility
                 WHERE featured = 1 AND hidden = 0 AND (?1 IS NULL OR contract = ?1)
                 ORDER BY updated_at DESC",
            )?;
            let rows = stmt
                .query_map([contract], map_visibility)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if no flags were stored for the token.
    pub fn clear_nft_visibility(&self, contract: &str, token_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM nft_visibility WHERE contract = ?1 AND token_id = ?2",
                params![contract, token_id],
            )?;
            Ok(removed > 0)
        })
    }
}

fn map_visibility(row: &rusqlite::Row<'_>) -> rusqlite::Result<NftVisibilityRow> {
    Ok(NftVisibilityRow {
        contract: row.get(0)?,
        token_id: row.get(1)?,
        hidden: row.get::<_, i64>(2)? != 0,
        featured: row.get::<_, i64>(3)? != 0,
        updated_by: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
