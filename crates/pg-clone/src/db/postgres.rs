//! PostgreSQL implementation of the source and target traits.

use crate::db::{value, RowScan, SourceDb, SqlValue, TargetDb};
use crate::error::{CloneError, Result};
use crate::ident::{qualify, quote_ident};
use crate::schema::ForeignKey;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::StreamExt;
use rustls::ClientConfig;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use tokio_postgres::config::SslMode;
use tokio_postgres::{NoTls, RowStream};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info, warn};

/// The run is sequential; connections are pooled for lifecycle management,
/// not concurrency.
const POOL_SIZE: usize = 2;

/// Upper bound on bind parameters in a single statement (wire protocol
/// counts them in a u16).
const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// A connection pool to one PostgreSQL database. Implements [`SourceDb`]
/// and [`TargetDb`]; which side a pool plays depends on which end of the
/// clone it was connected for.
pub struct PgPool {
    pool: Pool,
}

impl PgPool {
    /// Connect to a database given a libpq-style connection string.
    /// `context` names the side ("source" or "destination") in logs and
    /// errors. TLS is chosen from the connection string's `sslmode`.
    pub async fn connect(url: &str, context: &str) -> Result<Self> {
        let pg_config = tokio_postgres::Config::from_str(url).map_err(|e| {
            CloneError::Config(format!("invalid {} connection string: {}", context, e))
        })?;
        let dbname = pg_config.get_dbname().unwrap_or("").to_string();

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match pg_config.get_ssl_mode() {
            SslMode::Disable => {
                let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
                Pool::builder(mgr).max_size(POOL_SIZE).build()
            }
            _ => {
                warn!(
                    "{}: TLS enabled without certificate verification \
                     (sslmode=require semantics)",
                    context
                );
                let tls_config = ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoCertVerification))
                    .with_no_client_auth();
                let tls = MakeRustlsConnect::new(tls_config);
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr).max_size(POOL_SIZE).build()
            }
        }
        .map_err(|e| CloneError::connect(e.to_string(), format!("creating {} pool", context)))?;

        // Fail now rather than on first use.
        let client = pool.get().await.map_err(|e| {
            CloneError::connect(e.to_string(), format!("connecting to {} database", context))
        })?;
        client.simple_query("SELECT 1").await.map_err(|e| {
            CloneError::connect(e.to_string(), format!("testing {} connection", context))
        })?;

        info!("Connected to {} database '{}'", context, dbname);
        Ok(Self { pool })
    }

    async fn client(&self, doing: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| CloneError::connect(e.to_string(), format!("getting connection for {}", doing)))
    }
}

#[async_trait]
impl SourceDb for PgPool {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let client = self.client("list_tables").await?;

        let rows = client
            .query(
                "SELECT table_name FROM information_schema.tables
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[&schema],
            )
            .await
            .map_err(|e| CloneError::Schema(format!("listing tables: {}", e)))?;

        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn list_foreign_keys(&self, schema: &str) -> Result<Vec<ForeignKey>> {
        let client = self.client("list_foreign_keys").await?;

        let query = r#"
            SELECT
                tc.constraint_name,
                tc.table_name,
                kcu.column_name,
                ccu.table_name AS foreign_table_name,
                ccu.column_name AS foreign_column_name
            FROM information_schema.table_constraints AS tc
            JOIN information_schema.key_column_usage AS kcu
                ON tc.constraint_name = kcu.constraint_name
            JOIN information_schema.constraint_column_usage AS ccu
                ON ccu.constraint_name = tc.constraint_name
            WHERE tc.constraint_type = 'FOREIGN KEY'
              AND tc.table_schema = $1
            ORDER BY tc.constraint_name
        "#;

        let rows = client
            .query(query, &[&schema])
            .await
            .map_err(|e| CloneError::Schema(format!("listing foreign keys: {}", e)))?;

        let fks = rows
            .iter()
            .map(|row| ForeignKey {
                name: row.get(0),
                table: row.get(1),
                column: row.get(2),
                ref_table: row.get(3),
                ref_column: row.get(4),
            })
            .collect::<Vec<_>>();

        debug!("Found {} foreign keys in schema '{}'", fks.len(), schema);
        Ok(fks)
    }

    async fn column_list(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let client = self.client("column_list").await?;

        let rows = client
            .query(
                "SELECT column_name FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&schema, &table],
            )
            .await
            .map_err(|e| CloneError::Schema(format!("listing columns of {}: {}", table, e)))?;

        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn open_scan(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
    ) -> Result<Box<dyn RowScan>> {
        let client = self.client("open_scan").await?;

        let col_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!("SELECT {} FROM {}", col_list, qualify(schema, table)?);

        let stream = client.query_raw(sql.as_str(), std::iter::empty::<i32>()).await?;

        Ok(Box::new(PgScan {
            stream: Box::pin(stream),
            _client: client,
        }))
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Streaming scan over one table. Holds its connection for the lifetime of
/// the stream so the pool cannot hand it to anyone else mid-scan.
struct PgScan {
    stream: Pin<Box<RowStream>>,
    _client: Object,
}

#[async_trait]
impl RowScan for PgScan {
    async fn next_batch(&mut self, max_rows: usize) -> Result<Vec<Vec<SqlValue>>> {
        let mut rows = Vec::new();
        while rows.len() < max_rows {
            match self.stream.as_mut().next().await {
                Some(row) => rows.push(value::from_row(&row?)),
                None => break,
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl TargetDb for PgPool {
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let client = self.client("table_exists").await?;

        let row = client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = $1 AND table_name = $2
                )",
                &[&schema, &table],
            )
            .await?;

        Ok(row.get(0))
    }

    async fn truncate_table(&self, schema: &str, table: &str) -> Result<()> {
        let client = self.client("truncate_table").await?;

        let sql = format!("TRUNCATE TABLE {} RESTART IDENTITY", qualify(schema, table)?);
        client.execute(&sql, &[]).await?;

        debug!("Truncated {}.{}", schema, table);
        Ok(())
    }

    async fn insert_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        for row in &rows {
            if row.len() != columns.len() {
                return Err(CloneError::Schema(format!(
                    "row width {} does not match column list of {} for {}",
                    row.len(),
                    columns.len(),
                    table
                )));
            }
        }

        let client = self.client("insert_rows").await?;
        let per_statement = rows_per_statement(columns.len());

        let mut written = 0u64;
        for chunk in rows.chunks(per_statement) {
            let sql = build_insert_sql(schema, table, columns, chunk.len())?;
            let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = chunk
                .iter()
                .flat_map(|row| row.iter().map(|v| v as &(dyn tokio_postgres::types::ToSql + Sync)))
                .collect();

            written += client.execute(sql.as_str(), &params).await?;
        }

        Ok(written)
    }

    async fn drop_foreign_key(&self, schema: &str, fk: &ForeignKey) -> Result<()> {
        let client = self.client("drop_foreign_key").await?;
        let sql = build_drop_fk_sql(schema, fk)?;
        client.execute(&sql, &[]).await?;
        debug!("Dropped constraint {} on {}", fk.name, fk.table);
        Ok(())
    }

    async fn create_foreign_key(&self, schema: &str, fk: &ForeignKey) -> Result<()> {
        let client = self.client("create_foreign_key").await?;
        let sql = build_create_fk_sql(schema, fk)?;
        client.execute(&sql, &[]).await?;
        debug!("Restored constraint {} on {}", fk.name, fk.table);
        Ok(())
    }

    async fn sync_sequences(&self, schema: &str, table: &str, columns: &[String]) -> Result<()> {
        let client = self.client("sync_sequences").await?;
        let table_ref = qualify(schema, table)?;

        for column in columns {
            let row = client
                .query_one(
                    "SELECT pg_get_serial_sequence($1, $2)",
                    &[&table_ref, column],
                )
                .await?;
            let sequence: Option<String> = row.get(0);
            let Some(sequence) = sequence else { continue };

            let max_sql = format!(
                "SELECT COALESCE(MAX({})::bigint, 0) FROM {}",
                quote_ident(column)?,
                table_ref
            );
            let max: i64 = client.query_one(&max_sql, &[]).await?.get(0);
            if max == 0 {
                continue;
            }

            client
                .execute("SELECT setval($1::regclass, $2, true)", &[&sequence, &max])
                .await?;
            debug!("Set sequence {} to {}", sequence, max);
        }

        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Rows that fit in one statement without blowing the bind-parameter limit.
fn rows_per_statement(column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).max(1)
}

/// Build a multi-row insert with one parameter set per row:
/// `INSERT INTO "s"."t" ("a", "b") VALUES ($1, $2), ($3, $4)`.
fn build_insert_sql(
    schema: &str,
    table: &str,
    columns: &[String],
    row_count: usize,
) -> Result<String> {
    let col_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        qualify(schema, table)?,
        col_list
    );

    let width = columns.len();
    for row in 0..row_count {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..width {
            if col > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&format!("${}", row * width + col + 1));
        }
        sql.push(')');
    }

    Ok(sql)
}

// IF EXISTS on both the table and the constraint: the destination schema
// may be a subset of the source, and a rerun may have dropped the
// constraint already.
fn build_drop_fk_sql(schema: &str, fk: &ForeignKey) -> Result<String> {
    Ok(format!(
        "ALTER TABLE IF EXISTS {} DROP CONSTRAINT IF EXISTS {}",
        qualify(schema, &fk.table)?,
        quote_ident(&fk.name)?
    ))
}

fn build_create_fk_sql(schema: &str, fk: &ForeignKey) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        qualify(schema, &fk.table)?,
        quote_ident(&fk.name)?,
        quote_ident(&fk.column)?,
        qualify(schema, &fk.ref_table)?,
        quote_ident(&fk.ref_column)?
    ))
}

/// Certificate verifier that accepts any server certificate, matching
/// `sslmode=require`: the link is encrypted but the peer is not
/// authenticated. Use `sslmode=disable` or front the database with a
/// verifying proxy if that tradeoff is wrong for your environment.
#[derive(Debug)]
struct NoCertVerification;

impl rustls::client::danger::ServerCertVerifier for NoCertVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk() -> ForeignKey {
        ForeignKey {
            name: "Order_userId_fkey".into(),
            table: "Order".into(),
            column: "userId".into(),
            ref_table: "User".into(),
            ref_column: "id".into(),
        }
    }

    #[test]
    fn test_insert_sql_single_row() {
        let cols = vec!["id".to_string(), "name".to_string()];
        let sql = build_insert_sql("public", "User", &cols, 1).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"User\" (\"id\", \"name\") VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_insert_sql_numbers_placeholders_across_rows() {
        let cols = vec!["id".to_string(), "name".to_string()];
        let sql = build_insert_sql("public", "User", &cols, 3).unwrap();
        assert!(sql.ends_with("VALUES ($1, $2), ($3, $4), ($5, $6)"));
    }

    #[test]
    fn test_insert_sql_quotes_odd_identifiers() {
        let cols = vec!["select".to_string()];
        let sql = build_insert_sql("public", "od\"d", &cols, 1).unwrap();
        assert!(sql.starts_with("INSERT INTO \"public\".\"od\"\"d\" (\"select\")"));
    }

    #[test]
    fn test_rows_per_statement_bounds_parameters() {
        assert_eq!(rows_per_statement(1), 65535);
        assert_eq!(rows_per_statement(2), 32767);
        // Wider than the limit still makes progress one row at a time.
        assert_eq!(rows_per_statement(100_000), 1);
        assert_eq!(rows_per_statement(0), 65535);
    }

    #[test]
    fn test_drop_fk_sql_is_idempotent_form() {
        let sql = build_drop_fk_sql("public", &fk()).unwrap();
        assert_eq!(
            sql,
            "ALTER TABLE IF EXISTS \"public\".\"Order\" \
             DROP CONSTRAINT IF EXISTS \"Order_userId_fkey\""
        );
    }

    #[test]
    fn test_create_fk_sql_round_trips_definition() {
        let sql = build_create_fk_sql("public", &fk()).unwrap();
        assert_eq!(
            sql,
            "ALTER TABLE \"public\".\"Order\" ADD CONSTRAINT \"Order_userId_fkey\" \
             FOREIGN KEY (\"userId\") REFERENCES \"public\".\"User\" (\"id\")"
        );
    }
}
