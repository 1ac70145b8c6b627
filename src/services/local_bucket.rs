//! src/services/local_bucket.rs
//!
//! LocalBucket — a durable bucket backed by SQLite for metadata and local
//! disk for object payloads. Payloads are sharded beneath
//! `base_path/{shard}/{shard}/{key}` so no single directory grows unbounded.

use crate::{
    models::object::{ListOptions, ObjectBody, ObjectDescriptor, ObjectListing, PutOptions},
    services::bucket::{Bucket, StorageError, StorageResult, encode_cursor, validate_key},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::{
    FromRow, QueryBuilder, SqlitePool,
    sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// Schema statements, applied idempotently on open and by `--migrate`.
pub const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(FromRow, Debug)]
struct ObjectRow {
    key: String,
    size_bytes: i64,
    etag: String,
    content_type: Option<String>,
    uploaded: DateTime<Utc>,
}

impl From<ObjectRow> for ObjectDescriptor {
    fn from(row: ObjectRow) -> Self {
        ObjectDescriptor::new(
            row.key,
            row.size_bytes.max(0) as u64,
            row.etag,
            row.content_type,
            row.uploaded,
        )
    }
}

#[derive(Clone)]
pub struct LocalBucket {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl LocalBucket {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Connect to `database_url`, creating the database file and the payload
    /// directory when missing, and apply the schema.
    pub async fn open(database_url: &str, base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        run_schema(&db).await?;

        Ok(Self::new(Arc::new(db), base_path))
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase hex.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Fully-qualified payload path. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_row(&self, key: &str) -> StorageResult<Option<ObjectRow>> {
        let row = sqlx::query_as::<_, ObjectRow>(
            "SELECT key, size_bytes, etag, content_type, uploaded FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Write the payload to a temp file, fsync it, then rename into place.
    async fn write_payload(&self, file_path: &Path, value: &[u8]) -> StorageResult<()> {
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(value).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(&tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        Ok(())
    }

    /// Remove empty shard directories up to `base_path`.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Bucket for LocalBucket {
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        opts: PutOptions,
    ) -> StorageResult<ObjectDescriptor> {
        validate_key(key)?;

        let file_path = self.object_path(key);
        self.write_payload(&file_path, &value).await?;

        let etag = format!("{:x}", md5::compute(&value));
        let uploaded = Utc::now();

        let inserted = sqlx::query_as::<_, ObjectRow>(
            r#"
            INSERT INTO objects (key, size_bytes, etag, content_type, uploaded)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                content_type = excluded.content_type,
                uploaded = excluded.uploaded
            RETURNING key, size_bytes, etag, content_type, uploaded
            "#,
        )
        .bind(key)
        .bind(value.len() as i64)
        .bind(&etag)
        .bind(opts.content_type)
        .bind(uploaded)
        .fetch_one(&*self.db)
        .await;

        match inserted {
            Ok(row) => Ok(row.into()),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    async fn get(&self, key: &str) -> StorageResult<Option<ObjectBody>> {
        // An unsafe key can never have been written.
        if validate_key(key).is_err() {
            return Ok(None);
        }
        let Some(row) = self.fetch_row(key).await? else {
            return Ok(None);
        };

        let file = match File::open(self.object_path(key)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("metadata for {} exists but payload is missing", key);
                return Ok(None);
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        Ok(Some(ObjectBody {
            descriptor: row.into(),
            body: ReaderStream::new(file).boxed(),
        }))
    }

    async fn list(&self, opts: ListOptions) -> StorageResult<ObjectListing> {
        let limit = opts.effective_limit();
        let fetch_limit = limit + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT key, size_bytes, etag, content_type, uploaded FROM objects",
        );
        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut rows: Vec<ObjectRow> = builder.build_query_as().fetch_all(&*self.db).await?;

        let truncated = rows.len() == fetch_limit;
        if truncated {
            rows.pop();
        }
        let cursor = if truncated {
            rows.last().map(|row| encode_cursor(&row.key))
        } else {
            None
        };

        Ok(ObjectListing {
            objects: rows.into_iter().map(ObjectDescriptor::from).collect(),
            truncated,
            cursor,
        })
    }

    async fn delete(&self, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM objects WHERE key IN (");
        let mut separated = builder.separated(", ");
        for key in keys {
            separated.push_bind(key);
        }
        separated.push_unseparated(")");
        let result = builder.build().execute(&mut *tx).await?;
        tx.commit().await?;
        debug!("deleted {} metadata rows", result.rows_affected());

        for key in keys.iter().filter(|key| validate_key(key).is_ok()) {
            let file_path = self.object_path(key);
            match fs::remove_file(&file_path).await {
                Ok(_) => debug!("removed physical file {}", file_path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("file {} already missing", file_path.display());
                }
                Err(err) => {
                    // Rows are already committed; the file is left behind.
                    warn!("failed to remove payload {}: {}", file_path.display(), err);
                    continue;
                }
            }
            if let Some(parent) = file_path.parent() {
                self.prune_empty_dirs(parent).await;
            }
        }

        Ok(())
    }
}

/// Execute each statement of `SCHEMA` against `db`.
pub async fn run_schema(db: &SqlitePool) -> StorageResult<usize> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for stmt in &statements {
        debug!("Executing schema SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(statements.len())
}
