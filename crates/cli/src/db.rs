//! Config loading, database initialization and status

use anyhow::{Context, Result};
use fanledger_business::{AccountingExporter, ConfigError, ConfigLoader, LedgerConfig, ServiceContext};
use fanledger_persistence::{CreditTransactionRepo, Database};
use std::path::Path;

/// Load the config file, falling back to defaults when it is absent
pub fn load_config(path: &Path, db_override: Option<&str>) -> Result<LedgerConfig> {
    let mut config = match ConfigLoader::load_file(path) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), "config loaded");
            config
        }
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            LedgerConfig::default()
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to load config {:?}", path)),
    };

    if let Some(url) = db_override {
        config.database.url = url.to_string();
    }
    Ok(config)
}

/// Ensure the parent directory of a file-backed SQLite URL exists
fn ensure_data_dir(url: &str) -> Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(':') {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }
    }
    Ok(())
}

async fn connect(config: &LedgerConfig) -> Result<Database> {
    ensure_data_dir(&config.database.url)?;
    Database::connect(&config.database.url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))
}

/// Create the database file and run migrations
pub async fn init(config: &LedgerConfig) -> Result<()> {
    let db = connect(config).await?;
    db.close().await;
    println!("✅ Database ready at {}", config.database.url);
    Ok(())
}

/// Open the database and build the service context
pub async fn open(config: LedgerConfig) -> Result<ServiceContext> {
    let db = connect(&config).await?;
    ServiceContext::new(&db, config).context("Failed to build service context")
}

/// Show row counts and export queue state
pub async fn show_status(config: &LedgerConfig) -> Result<()> {
    let ctx = open(config.clone()).await?;

    let transactions = CreditTransactionRepo::count(ctx.pool()).await?;
    let (balances,): (i64,) = sqlx_count(&ctx, "SELECT COUNT(*) FROM credit_balances").await?;
    let (payments,): (i64,) = sqlx_count(&ctx, "SELECT COUNT(*) FROM payments").await?;
    let stats = AccountingExporter::new(&ctx).queue_stats().await?;

    println!("📊 Database Status");
    println!("   URL:          {}", config.database.url);
    println!(
        "   Accounting:   {}",
        config.accounting.endpoint.as_deref().unwrap_or("disabled")
    );
    println!();
    println!("   Users:        {}", balances);
    println!("   Transactions: {}", transactions);
    println!("   Payments:     {}", payments);
    println!(
        "   Export queue: {} pending, {} processing, {} completed, {} failed",
        stats.pending, stats.processing, stats.completed, stats.failed
    );

    ctx.pool().close().await;
    Ok(())
}

async fn sqlx_count(ctx: &ServiceContext, sql: &str) -> Result<(i64,)> {
    Ok(sqlx::query_as::<_, (i64,)>(sql).fetch_one(ctx.pool()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("absent.toml"), None).unwrap();
        assert_eq!(config.database.url, LedgerConfig::default().database.url);
        assert!(config.accounting.endpoint.is_none());
    }

    #[test]
    fn test_db_flag_overrides_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fanledger.toml");
        std::fs::write(&path, "[database]\nurl = \"sqlite:from_file.db\"\n").unwrap();

        assert_eq!(load_config(&path, None).unwrap().database.url, "sqlite:from_file.db");
        assert_eq!(
            load_config(&path, Some("sqlite:override.db")).unwrap().database.url,
            "sqlite:override.db"
        );
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fanledger.toml");
        std::fs::write(&path, "[commission]\nplatform_fee_rate = \"1.5\"\n").unwrap();

        assert!(load_config(&path, None).is_err());
    }

    #[test]
    fn test_data_dir_created_for_file_url() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/data/ledger.db");

        ensure_data_dir(&format!("sqlite:{}?mode=rwc", db_path.display())).unwrap();
        assert!(db_path.parent().unwrap().is_dir());
        ensure_data_dir("sqlite::memory:").unwrap();
    }

    #[tokio::test]
    async fn test_init_then_open() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = LedgerConfig::default();
        config.database.url = format!("sqlite:{}", temp_dir.path().join("ledger.db").display());

        init(&config).await.unwrap();
        let ctx = open(config).await.unwrap();
        assert_eq!(CreditTransactionRepo::count(ctx.pool()).await.unwrap(), 0);
    }
}
