//! Array open/close lifecycle.
//!
//! An [`Array`] is a handle to one stored array: its URI, its storage, and
//! the state loaded when the array is opened (schema plus the fragments
//! visible in the opened timestamp window). Queries hold the array behind
//! an `Arc` and read or append fragments through it.

use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::schema::ArraySchema;
use crate::status::QueryType;
use crate::storage::{fragment_address, fragment_prefix, schema_address, Storage};
use std::sync::{Arc, RwLock};

#[derive(Debug)]
struct OpenedState {
    query_type: QueryType,
    timestamp_start: u64,
    timestamp_end: u64,
    schema: Arc<ArraySchema>,
    fragments: Vec<Fragment>,
}

/// Handle to one stored array
#[derive(Debug)]
pub struct Array {
    uri: String,
    storage: Arc<dyn Storage>,
    state: RwLock<Option<OpenedState>>,
}

impl Array {
    /// Create a new array handle (not yet opened)
    pub fn new(storage: Arc<dyn Storage>, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            storage,
            state: RwLock::new(None),
        }
    }

    /// Create the array on storage by persisting its schema.
    ///
    /// Fails if an array already exists at the URI.
    pub async fn create(
        storage: &Arc<dyn Storage>,
        uri: &str,
        schema: &ArraySchema,
    ) -> Result<()> {
        let address = schema_address(uri);
        if storage.exists(&address).await? {
            return Err(Error::invalid_argument(format!(
                "array already exists at '{}'",
                uri
            )));
        }
        let bytes = serde_json::to_vec(schema)?;
        storage.write_bytes(&address, &bytes).await
    }

    /// URI of this array
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Open the array for `query_type`, loading the schema and the
    /// fragments whose timestamps fall in `[timestamp_start, timestamp_end]`.
    pub async fn open(
        &self,
        query_type: QueryType,
        timestamp_start: u64,
        timestamp_end: u64,
    ) -> Result<()> {
        {
            let state = self.state.read().expect("RwLock poisoned");
            if state.is_some() {
                return Err(Error::invalid_argument(format!(
                    "array '{}' is already open",
                    self.uri
                )));
            }
        }

        let schema_bytes = self.storage.read_bytes(&schema_address(&self.uri)).await?;
        let schema: ArraySchema = serde_json::from_slice(&schema_bytes)?;

        let mut fragments = Vec::new();
        for address in self
            .storage
            .list_prefix(&fragment_prefix(&self.uri))
            .await?
        {
            let bytes = self.storage.read_bytes(&address).await?;
            let fragment: Fragment = serde_json::from_slice(&bytes)?;
            if fragment.timestamp() >= timestamp_start && fragment.timestamp() <= timestamp_end {
                fragments.push(fragment);
            }
        }
        fragments.sort_by_key(|f| f.timestamp());

        tracing::debug!(
            uri = %self.uri,
            query_type = %query_type,
            fragments = fragments.len(),
            "opened array"
        );

        let mut state = self.state.write().expect("RwLock poisoned");
        *state = Some(OpenedState {
            query_type,
            timestamp_start,
            timestamp_end,
            schema: Arc::new(schema),
            fragments,
        });
        Ok(())
    }

    /// Close the array, dropping the loaded state
    pub fn close(&self) {
        let mut state = self.state.write().expect("RwLock poisoned");
        *state = None;
    }

    /// True when the array is currently open
    pub fn is_open(&self) -> bool {
        self.state.read().expect("RwLock poisoned").is_some()
    }

    fn with_state<T>(&self, f: impl FnOnce(&OpenedState) -> T) -> Result<T> {
        let state = self.state.read().expect("RwLock poisoned");
        state
            .as_ref()
            .map(f)
            .ok_or_else(|| Error::invalid_argument(format!("array '{}' is not open", self.uri)))
    }

    /// True when no fragments are visible in the opened window
    pub fn is_empty(&self) -> Result<bool> {
        self.with_state(|s| s.fragments.is_empty())
    }

    /// The query type the array was opened for
    pub fn query_type(&self) -> Result<QueryType> {
        self.with_state(|s| s.query_type)
    }

    /// Start of the opened timestamp window
    pub fn timestamp_start(&self) -> Result<u64> {
        self.with_state(|s| s.timestamp_start)
    }

    /// End of the opened timestamp window
    pub fn timestamp_end(&self) -> Result<u64> {
        self.with_state(|s| s.timestamp_end)
    }

    /// The latest schema of the opened array
    pub fn schema(&self) -> Result<Arc<ArraySchema>> {
        self.with_state(|s| Arc::clone(&s.schema))
    }

    /// Snapshot of the fragments visible in the opened window
    pub fn fragments(&self) -> Result<Vec<Fragment>> {
        self.with_state(|s| s.fragments.clone())
    }

    /// Persist a fragment and make it visible to this handle.
    ///
    /// Only valid when the array is open for writing.
    pub async fn append_fragment(&self, fragment: Fragment) -> Result<()> {
        let query_type = self.query_type()?;
        if query_type != QueryType::Write {
            return Err(Error::invalid_argument(format!(
                "cannot write fragment to array '{}' opened for {}",
                self.uri, query_type
            )));
        }
        let address = fragment_address(&self.uri, fragment.name());
        let bytes = serde_json::to_vec(&fragment)?;
        self.storage.write_bytes(&address, &bytes).await?;

        let mut state = self.state.write().expect("RwLock poisoned");
        let state = state
            .as_mut()
            .ok_or_else(|| Error::internal("array closed during fragment append"))?;
        state.fragments.push(fragment);
        Ok(())
    }
}
