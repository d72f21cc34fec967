//! Channels/credentials CRUD (§6 relational schema), backing
//! `/api/admin/channels` and `/api/admin/credentials`. No direct Python
//! counterpart function-for-function; grounded on the `channels`/
//! `credentials` table shapes already established in `store/mod.rs`'s
//! schema and `channel_service.py`'s channel-record semantics.

use rusqlite::{params, Connection};

use crate::domain::{Channel, Credential};
use crate::error::AppError;

use super::Store;

impl Store {
    pub fn list_channels(&self) -> Result<Vec<Channel>, AppError> {
        list_channels(&self.conn()?)
    }

    pub fn create_channel(&self, username: &str) -> Result<Channel, AppError> {
        create_channel(&self.conn()?, username)
    }

    pub fn update_channel(&self, id: i64, username: &str) -> Result<(), AppError> {
        update_channel(&self.conn()?, id, username)
    }

    pub fn delete_channel(&self, id: i64) -> Result<(), AppError> {
        delete_channel(&self.conn()?, id)
    }

    pub fn list_credentials(&self) -> Result<Vec<Credential>, AppError> {
        list_credentials(&self.conn()?)
    }

    pub fn create_credential(&self, api_id: &str, api_hash: &str) -> Result<Credential, AppError> {
        create_credential(&self.conn()?, api_id, api_hash)
    }

    pub fn delete_credential(&self, id: i64) -> Result<(), AppError> {
        delete_credential(&self.conn()?, id)
    }
}

fn list_channels(conn: &Connection) -> Result<Vec<Channel>, AppError> {
    let mut stmt = conn
        .prepare("SELECT id, username FROM channels ORDER BY id")
        .map_err(|e| AppError::Store(format!("prepare list_channels: {e}")))?;
    let rows = stmt
        .query_map([], |row| Ok(Channel { id: row.get(0)?, username: row.get(1)? }))
        .map_err(|e| AppError::Store(format!("run list_channels: {e}")))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| AppError::Store(format!("decode channel row: {e}")))
}

fn create_channel(conn: &Connection, username: &str) -> Result<Channel, AppError> {
    conn.execute("INSERT INTO channels (username) VALUES (?1)", params![username])
        .map_err(|e| AppError::Store(format!("insert channel {username}: {e}")))?;
    Ok(Channel { id: conn.last_insert_rowid(), username: username.to_string() })
}

fn update_channel(conn: &Connection, id: i64, username: &str) -> Result<(), AppError> {
    let updated = conn
        .execute("UPDATE channels SET username = ?1 WHERE id = ?2", params![username, id])
        .map_err(|e| AppError::Store(format!("update channel {id}: {e}")))?;
    if updated == 0 {
        return Err(AppError::NotFound(format!("channel {id} not found")));
    }
    Ok(())
}

fn delete_channel(conn: &Connection, id: i64) -> Result<(), AppError> {
    let deleted = conn
        .execute("DELETE FROM channels WHERE id = ?1", params![id])
        .map_err(|e| AppError::Store(format!("delete channel {id}: {e}")))?;
    if deleted == 0 {
        return Err(AppError::NotFound(format!("channel {id} not found")));
    }
    Ok(())
}

fn list_credentials(conn: &Connection) -> Result<Vec<Credential>, AppError> {
    let mut stmt = conn
        .prepare("SELECT id, api_id, api_hash FROM credentials ORDER BY id")
        .map_err(|e| AppError::Store(format!("prepare list_credentials: {e}")))?;
    let rows = stmt
        .query_map([], |row| Ok(Credential { id: row.get(0)?, api_id: row.get(1)?, api_hash: row.get(2)? }))
        .map_err(|e| AppError::Store(format!("run list_credentials: {e}")))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| AppError::Store(format!("decode credential row: {e}")))
}

fn create_credential(conn: &Connection, api_id: &str, api_hash: &str) -> Result<Credential, AppError> {
    conn.execute("INSERT INTO credentials (api_id, api_hash) VALUES (?1, ?2)", params![api_id, api_hash])
        .map_err(|e| AppError::Store(format!("insert credential: {e}")))?;
    Ok(Credential { id: conn.last_insert_rowid(), api_id: api_id.to_string(), api_hash: api_hash.to_string() })
}

fn delete_credential(conn: &Connection, id: i64) -> Result<(), AppError> {
    let deleted = conn
        .execute("DELETE FROM credentials WHERE id = ?1", params![id])
        .map_err(|e| AppError::Store(format!("delete credential {id}: {e}")))?;
    if deleted == 0 {
        return Err(AppError::NotFound(format!("credential {id} not found")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_schema() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        super::super::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn channel_crud_round_trips() {
        let conn = conn_with_schema();
        let created = create_channel(&conn, "news_channel").unwrap();
        assert_eq!(list_channels(&conn).unwrap().len(), 1);
        update_channel(&conn, created.id, "renamed_channel").unwrap();
        assert_eq!(list_channels(&conn).unwrap()[0].username, "renamed_channel");
        delete_channel(&conn, created.id).unwrap();
        assert!(list_channels(&conn).unwrap().is_empty());
    }

    #[test]
    fn deleting_missing_channel_is_not_found() {
        let conn = conn_with_schema();
        assert!(delete_channel(&conn, 999).is_err());
    }

    #[test]
    fn credential_crud_round_trips() {
        let conn = conn_with_schema();
        let created = create_credential(&conn, "12345", "abcdef").unwrap();
        assert_eq!(list_credentials(&conn).unwrap().len(), 1);
        delete_credential(&conn, created.id).unwrap();
        assert!(list_credentials(&conn).unwrap().is_empty());
    }
}
