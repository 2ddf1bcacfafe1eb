//! Range-keyed backend: `blocks(posx, posy, posz, data)` with one integer
//! column per axis, so regions map onto plain `BETWEEN` predicates.

use std::future::Future;
use std::str::FromStr;

use futures::TryStreamExt;
use sqlx::Row;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};

use lopater_engine::world::position::{Position, Region};

use super::{BlockStorage, ScanSummary, StorageError};

const MAX_CONNECTIONS: u32 = 4;

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect using either a `postgres://` URL or a libpq-style
    /// `key=value` string as found in `world.mt`.
    pub async fn connect(conn: &str) -> Result<Self, StorageError> {
        let options = connect_options(conn)?;
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn connect_options(conn: &str) -> Result<PgConnectOptions, StorageError> {
    let conn = conn.trim();
    if conn.starts_with("postgres://") || conn.starts_with("postgresql://") {
        return PgConnectOptions::from_str(conn)
            .map_err(|e| StorageError::InvalidConnectionString(e.to_string()));
    }

    let mut options = PgConnectOptions::new();
    for (key, value) in libpq_pairs(conn)? {
        let value = value.as_str();
        options = match key.as_str() {
            "host" | "hostaddr" => options.host(value),
            "port" => {
                let port = value.parse::<u16>().map_err(|_| {
                    StorageError::InvalidConnectionString(format!("invalid port `{value}`"))
                })?;
                options.port(port)
            }
            "user" => options.username(value),
            "password" => options.password(value),
            "dbname" => options.database(value),
            "sslmode" => {
                let mode = PgSslMode::from_str(value).map_err(|_| {
                    StorageError::InvalidConnectionString(format!("invalid sslmode `{value}`"))
                })?;
                options.ssl_mode(mode)
            }
            "application_name" => options.application_name(value),
            other => {
                tracing::debug!("Ignoring connection parameter {:?}", other);
                options
            }
        };
    }
    Ok(options)
}

/// Split a libpq `key = value` string. Values may be single-quoted to hold
/// spaces; a backslash escapes the next character, quoted or not.
fn libpq_pairs(conn: &str) -> Result<Vec<(String, String)>, StorageError> {
    let invalid = StorageError::InvalidConnectionString;
    let mut pairs = Vec::new();
    let mut chars = conn.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            return Ok(pairs);
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(invalid(format!("expected `=` after `{key}`")));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\'') => break,
                    Some('\\') => match chars.next() {
                        Some(c) => value.push(c),
                        None => return Err(invalid(format!("unterminated quoted value for `{key}`"))),
                    },
                    Some(c) => value.push(c),
                    None => return Err(invalid(format!("unterminated quoted value for `{key}`"))),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                if c == '\\' {
                    match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => return Err(invalid(format!("dangling escape in `{key}`"))),
                    }
                } else {
                    value.push(c);
                }
            }
        }
        pairs.push((key, value));
    }
}

impl BlockStorage for PostgresStorage {
    async fn get_block(&self, pos: Position) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT data FROM blocks WHERE posx = $1 AND posy = $2 AND posz = $3")
            .bind(pos.x)
            .bind(pos.y)
            .bind(pos.z)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("data")?)),
            None => Ok(None),
        }
    }

    async fn set_block(&self, pos: Position, data: &[u8]) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO blocks (posx, posy, posz, data) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (posx, posy, posz) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(pos.x)
        .bind(pos.y)
        .bind(pos.z)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scan_region<F, Fut>(
        &self,
        region: Region,
        mut on_block: F,
    ) -> Result<ScanSummary, StorageError>
    where
        F: FnMut(Position, Vec<u8>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut rows = sqlx::query(
            "SELECT posx, posy, posz, data FROM blocks \
             WHERE posx BETWEEN $1 AND $2 \
               AND posy BETWEEN $3 AND $4 \
               AND posz BETWEEN $5 AND $6",
        )
        .bind(region.min.x)
        .bind(region.max.x)
        .bind(region.min.y)
        .bind(region.max.y)
        .bind(region.min.z)
        .bind(region.max.z)
        .fetch(&self.pool);

        let mut summary = ScanSummary::default();
        while let Some(row) = rows.try_next().await? {
            let pos = Position::new(row.try_get("posx")?, row.try_get("posy")?, row.try_get("posz")?);
            summary.deliver(&mut on_block, pos, row.try_get("data")?).await;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_libpq_key_values() {
        let options =
            connect_options("host=db.local port=5433 user=mt password=s3cret dbname=world sslmode=disable")
                .unwrap();
        assert_eq!(options.get_host(), "db.local");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_username(), "mt");
        assert_eq!(options.get_database(), Some("world"));
    }

    #[test]
    fn parses_url() {
        let options = connect_options("postgres://mt@localhost:5432/world").unwrap();
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_database(), Some("world"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let options = connect_options("dbname=world connect_timeout=10").unwrap();
        assert_eq!(options.get_database(), Some("world"));
    }

    #[test]
    fn quoted_values_keep_spaces_and_escapes() {
        let pairs = libpq_pairs(r"host = db password='a b\'c' dbname=my\ world").unwrap();
        let pairs: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(pairs, [("host", "db"), ("password", "a b'c"), ("dbname", "my world")]);

        let options = connect_options("user='mt' dbname='my world'").unwrap();
        assert_eq!(options.get_username(), "mt");
        assert_eq!(options.get_database(), Some("my world"));
    }

    #[test]
    fn empty_quoted_value() {
        let pairs = libpq_pairs("password='' dbname=w").unwrap();
        assert_eq!(pairs[0], ("password".to_string(), String::new()));
        assert_eq!(pairs[1], ("dbname".to_string(), "w".to_string()));
    }

    #[test]
    fn rejects_unterminated_quote() {
        assert!(matches!(
            connect_options("password='a b"),
            Err(StorageError::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn rejects_bad_pairs() {
        assert!(matches!(
            connect_options("host"),
            Err(StorageError::InvalidConnectionString(_))
        ));
        assert!(matches!(
            connect_options("port=abc"),
            Err(StorageError::InvalidConnectionString(_))
        ));
        assert!(matches!(
            connect_options("sslmode=sometimes"),
            Err(StorageError::InvalidConnectionString(_))
        ));
    }
}
