use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

use crate::error::BotError;
use crate::models::Trade;
use crate::Result;

/// Durable symbol → open trade mapping
///
/// Every call must be durable before it returns. Records are partitioned by
/// symbol and each symbol has a single writer (its position manager).
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn load(&self, symbol: &str) -> Result<Option<Trade>>;

    async fn save(&self, symbol: &str, trade: &Trade) -> Result<()>;

    /// Removing a symbol without a record is a no-op
    async fn delete(&self, symbol: &str) -> Result<()>;
}

/// One JSON file per symbol: `trades_<SYMBOL>.json` holding `{ "<SYMBOL>": trade }`
pub struct JsonTradeStore {
    dir: PathBuf,
}

impl JsonTradeStore {
    /// Create the store, making `dir` if it does not exist
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error("create trade directory", &dir, e))?;

        tracing::info!("Trade store at {}", dir.display());
        Ok(Self { dir })
    }

    /// File holding the record for `symbol` (`/` is not allowed in file names)
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir
            .join(format!("trades_{}.json", symbol.replace('/', "_")))
    }
}

impl JsonTradeStore {
    /// Flush directory entries so a rename or unlink survives power loss
    #[cfg(unix)]
    async fn sync_dir(&self) -> Result<()> {
        let dir = tokio::fs::File::open(&self.dir)
            .await
            .map_err(|e| io_error("open", &self.dir, e))?;
        dir.sync_all()
            .await
            .map_err(|e| io_error("sync", &self.dir, e))
    }

    // Directories can't be opened as files on Windows
    #[cfg(not(unix))]
    async fn sync_dir(&self) -> Result<()> {
        Ok(())
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> BotError {
    BotError::Persistence(format!("{} {}: {}", action, path.display(), err))
}

#[async_trait]
impl TradeStore for JsonTradeStore {
    async fn load(&self, symbol: &str) -> Result<Option<Trade>> {
        let path = self.path_for(symbol);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, e)),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        let mut trades: HashMap<String, Trade> = serde_json::from_str(&contents)
            .map_err(|e| BotError::Persistence(format!("parse {}: {}", path.display(), e)))?;

        Ok(trades.remove(symbol))
    }

    async fn save(&self, symbol: &str, trade: &Trade) -> Result<()> {
        let path = self.path_for(symbol);
        let tmp = path.with_extension("json.tmp");

        let mut record = HashMap::new();
        record.insert(symbol, trade);
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| BotError::Persistence(format!("serialize trade for {}: {}", symbol, e)))?;

        // Write-then-rename so a crash never leaves a half-written record
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| io_error("create", &tmp, e))?;
        file.write_all(&json)
            .await
            .map_err(|e| io_error("write", &tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error("sync", &tmp, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error("rename", &path, e))?;
        self.sync_dir().await?;

        tracing::debug!(symbol = %symbol, path = %path.display(), "Saved trade");
        Ok(())
    }

    async fn delete(&self, symbol: &str) -> Result<()> {
        let path = self.path_for(symbol);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.sync_dir().await?;
                tracing::debug!(symbol = %symbol, "Deleted trade record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete", &path, e)),
        }
    }
}

/// In-process store for dry runs and tests
#[derive(Default)]
pub struct MemoryTradeStore {
    trades: Mutex<HashMap<String, Trade>>,
}

impl MemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.trades.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_trades<T>(&self, f: impl FnOnce(&mut HashMap<String, Trade>) -> T) -> Result<T> {
        let mut guard = self
            .trades
            .lock()
            .map_err(|_| BotError::Persistence("memory store lock poisoned".into()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl TradeStore for MemoryTradeStore {
    async fn load(&self, symbol: &str) -> Result<Option<Trade>> {
        self.with_trades(|t| t.get(symbol).cloned())
    }

    async fn save(&self, symbol: &str, trade: &Trade) -> Result<()> {
        self.with_trades(|t| {
            t.insert(symbol.to_string(), trade.clone());
        })
    }

    async fn delete(&self, symbol: &str) -> Result<()> {
        self.with_trades(|t| {
            t.remove(symbol);
        })
    }
}
