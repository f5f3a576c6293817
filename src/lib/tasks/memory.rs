use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::types::{
    ContainerSpec, CreateRequest, RuntimeClient, RuntimeError, RuntimeResult, TaskRecord,
    TaskSpec, TaskState, TaskStatus,
};

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    request: CreateRequest,
    task: Option<TaskRecord>,
    logs: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    created: Vec<CreateRequest>,
    next_failure: Option<RuntimeError>,
}

/// Runtime kept entirely in process memory. Objects only move through their
/// lifecycle when the owner reports a new task state.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    inner: Mutex<Inner>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next runtime call fail with `err`.
    pub async fn fail_next(&self, err: RuntimeError) {
        self.inner.lock().await.next_failure = Some(err);
    }

    /// Every request `create` accepted, oldest first.
    pub async fn created_requests(&self) -> Vec<CreateRequest> {
        self.inner.lock().await.created.clone()
    }

    /// Report a native task state for the job called `name`.
    pub async fn report_state(&self, name: &str, state: &str, message: &str) -> RuntimeResult<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .entries
            .get_mut(name)
            .ok_or_else(|| not_found(name))?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().to_string())
            .unwrap_or_default();

        entry.task = Some(TaskRecord {
            spec: TaskSpec {
                container_spec: ContainerSpec {
                    image: entry.request.image.clone(),
                    command: entry.request.args.clone(),
                },
            },
            status: TaskStatus {
                timestamp,
                message: message.to_string(),
            },
            state: TaskState {
                status: state.to_string(),
            },
        });
        Ok(())
    }

    pub async fn push_log(&self, name: &str, chunk: &[u8]) -> RuntimeResult<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .entries
            .get_mut(name)
            .ok_or_else(|| not_found(name))?;
        entry.logs.push(chunk.to_vec());
        Ok(())
    }

    fn by_id<'a>(inner: &'a Inner, id: &str) -> RuntimeResult<&'a Entry> {
        inner
            .entries
            .values()
            .find(|entry| entry.id == id)
            .ok_or_else(|| not_found(id))
    }
}

fn not_found(what: &str) -> RuntimeError {
    RuntimeError::new(404, format!("no such container: {what}"))
}

#[async_trait]
impl RuntimeClient for InMemoryRuntime {
    async fn create(&self, request: &CreateRequest) -> RuntimeResult<String> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.next_failure.take() {
            return Err(err);
        }
        if inner.entries.contains_key(&request.name) {
            return Err(RuntimeError::new(
                409,
                format!("container name {} is already in use", request.name),
            ));
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        inner.created.push(request.clone());
        inner.entries.insert(
            request.name.clone(),
            Entry {
                id: id.clone(),
                request: request.clone(),
                task: None,
                logs: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn get(&self, name: &str) -> RuntimeResult<String> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.next_failure.take() {
            return Err(err);
        }
        inner
            .entries
            .get(name)
            .map(|entry| entry.id.clone())
            .ok_or_else(|| not_found(name))
    }

    async fn inspect(&self, id: &str) -> RuntimeResult<Option<TaskRecord>> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.next_failure.take() {
            return Err(err);
        }
        Ok(Self::by_id(&inner, id)?.task.clone())
    }

    async fn logs(&self, id: &str) -> RuntimeResult<Vec<Vec<u8>>> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.next_failure.take() {
            return Err(err);
        }
        Ok(Self::by_id(&inner, id)?.logs.clone())
    }

    async fn remove(&self, id: &str) -> RuntimeResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.next_failure.take() {
            return Err(err);
        }
        let name = Self::by_id(&inner, id)?.request.name.clone();
        inner.entries.remove(&name);
        Ok(())
    }
}
