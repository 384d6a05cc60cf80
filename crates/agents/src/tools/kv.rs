//! Key/value facts in the `generic` namespace.

use std::sync::Arc;

use async_trait::async_trait;
use buddy_common::{BuddyError, Namespace, Result};
use buddy_memory::MemoryStore;
use serde_json::{json, Value};

use super::{Tool, ToolOutput, ToolRequest};

pub struct KvTool {
    store: Arc<MemoryStore>,
}

impl KvTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for KvTool {
    fn name(&self) -> &'static str {
        "kv"
    }

    fn description(&self) -> &'static str {
        "Store, read and delete small facts about the user"
    }

    fn actions(&self) -> &'static [&'static str] {
        &["get", "set", "delete"]
    }

    fn max_args(&self) -> usize {
        3
    }

    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let key = request.required_str("key")?;
        let output = match request.action.as_str() {
            "get" => match self.store.get(Namespace::Generic, &request.user_id, key).await {
                Ok(record) => json!({ "key": key, "value": record.value, "found": true }),
                Err(BuddyError::NotFound(_)) => json!({ "key": key, "value": Value::Null, "found": false }),
                Err(e) => return Err(e),
            },
            "set" => {
                let value = request
                    .arguments
                    .get("value")
                    .cloned()
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| BuddyError::Tool("missing argument 'value'".into()))?;
                let record = self
                    .store
                    .upsert(Namespace::Generic, &request.user_id, key, value)
                    .await?;
                json!({ "key": key, "updated_at": record.updated_at })
            }
            _ => {
                self.store
                    .delete(Namespace::Generic, &request.user_id, key)
                    .await?;
                json!({ "key": key, "deleted": true })
            }
        };
        Ok(ToolOutput::new(self.name(), &request.action, output))
    }
}
