//! Settings table: (name -> value) string pairs (§3), including server
//! identity material and the last-known CAN record hash.

use super::locks::SETTINGS;
use super::Store;
use crate::error::Result;

impl Store {
    pub fn get_setting(&self, name: &str) -> Result<Option<String>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE name = ?1")?;
        let mut rows = stmt.query([name])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn set_setting(&self, name: &str, value: &str) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO settings(name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            rusqlite::params![name, value],
        )?;
        Ok(())
    }

    pub async fn set_setting_async(&self, name: &'static str, value: String) -> Result<()> {
        self.unit_of_work(&[SETTINGS], move |tx| {
            tx.execute(
                "INSERT INTO settings(name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                rusqlite::params![name, value],
            )?;
            Ok(())
        })
        .await
    }
}
