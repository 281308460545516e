//! `FakeAdapter` — an in-memory `BackendAdapter` double for orchestrator
//! tests that exercise import/export/webhook flow without any network I/O.
//! Library pages and webhook deliveries are pre-seeded; `push`/`progress`
//! record what they were asked to send instead of making a request.

use std::sync::Mutex;

use async_trait::async_trait;
use semver::Version;
use ws_adapters::{BackendAdapter, Context};
use ws_queue::Queue;
use ws_types::{
    AdapterError, BackendUser, Library, PageRequest, RawItem, RawPage, RequestAttributes, Response,
    State, WebhookRequest,
};

#[derive(Default)]
pub struct FakeAdapter {
    pub backend_name: String,
    pub libraries: Vec<Library>,
    /// One page of already-converted `State`s per `PageRequest::offset`.
    pub pages: Vec<Vec<State>>,
    pub webhook_states: Mutex<Vec<State>>,
    pub pushed: Mutex<Vec<State>>,
    pub progressed: Mutex<Vec<State>>,
    pub version: Option<Version>,
    /// Makes `list_libraries` return an error, for exercising import's
    /// per-backend failure isolation (spec scenario S4).
    pub fail_list_libraries: bool,
}

impl FakeAdapter {
    pub fn new(backend_name: impl Into<String>) -> Self {
        FakeAdapter {
            backend_name: backend_name.into(),
            version: Some(Version::new(10, 9, 0)),
            ..Default::default()
        }
    }

    pub fn with_library(mut self, library: Library) -> Self {
        self.libraries.push(library);
        self
    }

    pub fn with_page(mut self, states: Vec<State>) -> Self {
        self.pages.push(states);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.fail_list_libraries = true;
        self
    }

    /// Queue a `State` to be returned by the next `parse_webhook` call.
    pub fn queue_webhook(&self, state: State) {
        self.webhook_states.lock().unwrap().push(state);
    }
}

#[async_trait]
impl BackendAdapter for FakeAdapter {
    fn name(&self) -> &str {
        &self.backend_name
    }

    async fn list_libraries(&self, _ctx: &Context) -> Response<Vec<Library>> {
        if self.fail_list_libraries {
            return Err(AdapterError::transient("backend unreachable"));
        }
        Ok(self.libraries.clone())
    }

    async fn get_library_page(&self, _ctx: &Context, req: &PageRequest, _queue: &Queue) -> Response<RawPage> {
        let idx = (req.offset / req.limit.max(1)) as usize;
        // Wrapped under "Items" so this composes with the real
        // `streaming::items_in` decode path, not just a hand-rolled test shortcut.
        let body = serde_json::to_vec(&serde_json::json!({ "Items": [idx] })).unwrap_or_default();
        Ok(RawPage { body, total: Some(self.pages.iter().map(Vec::len).sum::<usize>() as u32) })
    }

    async fn get_metadata(&self, _ctx: &Context, remote_id: &str) -> Response<RawItem> {
        Ok(RawItem::new(serde_json::json!({"id": remote_id})))
    }

    fn to_states(&self, _ctx: &Context, raw: &RawItem) -> Response<Vec<State>> {
        let idx: usize = serde_json::from_value(raw.value.clone()).unwrap_or(0);
        Ok(self.pages.get(idx).cloned().unwrap_or_default())
    }

    fn parse_webhook(&self, _ctx: &Context, _req: &WebhookRequest) -> Response<State> {
        self.webhook_states
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| AdapterError::validation("no webhook state queued on FakeAdapter"))
    }

    fn inspect_request(&self, _ctx: &Context, _req: &WebhookRequest) -> Response<RequestAttributes> {
        Ok(RequestAttributes::default())
    }

    async fn push(&self, _ctx: &Context, states: &[State], _queue: &mut Queue) -> Response<()> {
        self.pushed.lock().unwrap().extend_from_slice(states);
        Ok(())
    }

    async fn progress(&self, _ctx: &Context, states: &[State], _queue: &mut Queue) -> Response<()> {
        self.progressed.lock().unwrap().extend_from_slice(states);
        Ok(())
    }

    async fn search(&self, _ctx: &Context, _query: &str, _limit: u32) -> Response<Vec<RawItem>> {
        Ok(Vec::new())
    }

    async fn search_by_id(&self, _ctx: &Context, remote_id: &str) -> Response<Vec<RawItem>> {
        Ok(vec![RawItem::new(serde_json::json!({"id": remote_id}))])
    }

    async fn get_identifier(&self, _ctx: &Context, _force_refresh: bool) -> Response<String> {
        Ok(format!("{}-fake-uuid", self.backend_name))
    }

    async fn list_users(&self, _ctx: &Context) -> Response<Vec<BackendUser>> {
        Ok(Vec::new())
    }

    async fn get_version(&self, _ctx: &Context) -> Response<Version> {
        self.version
            .clone()
            .ok_or_else(|| AdapterError::validation("FakeAdapter has no version configured"))
    }
}
