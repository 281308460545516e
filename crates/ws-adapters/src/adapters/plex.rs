//! Plex adapter — spec §4.2: `X-Plex-Token` header, `Guid[]` entries of
//! form `source://id`, multipart-webhook with a JSON `payload` part.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use semver::Version;
use serde::Deserialize;
use serde_json::Value;
use ws_queue::{Queue, Request, ReqwestTransport, Transport};
use ws_types::{
    AdapterError, BackendUser, Library, LibraryKind, MediaKind, Metadata, PageRequest, RawItem,
    RawPage, RequestAttributes, Response, State, WebhookRequest,
};

use crate::context::Context;
use crate::guid_extract::push_validated;

pub struct PlexAdapter {
    transport: Arc<dyn Transport>,
}

impl Default for PlexAdapter {
    fn default() -> Self {
        PlexAdapter {
            transport: Arc::new(ReqwestTransport::default()),
        }
    }
}

impl PlexAdapter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        PlexAdapter { transport }
    }

    fn auth_request(&self, ctx: &Context, method: reqwest::Method, path: &str, tag: &str) -> Request {
        Request::new(method, format!("{}{path}", ctx.base_url), tag)
            .with_header("X-Plex-Token", ctx.token.clone())
            .with_header("Accept", "application/json")
    }

    async fn call(&self, req: &Request) -> Response<Vec<u8>> {
        let resp = self
            .transport
            .execute(req)
            .await
            .map_err(|e| AdapterError::transient(e.to_string()).with_context("tag", &req.tag))?;
        if !resp.is_success() {
            return Err(AdapterError::new(
                ws_types::ErrorLevel::Error,
                format!("plex request failed: {}", req.url),
            )
            .with_http(resp.status, String::from_utf8_lossy(&resp.body).into_owned()));
        }
        Ok(resp.body)
    }

    /// Same contract as `call`, but runs through the orchestrator's queue
    /// so the request gets retried on transient failure like a write does.
    async fn call_via_queue(&self, queue: &Queue, req: Request) -> Response<Vec<u8>> {
        match queue.execute(req.clone()).await {
            ws_queue::QueueOutcome::Success { response, .. } if response.is_success() => Ok(response.body),
            ws_queue::QueueOutcome::Success { response, .. } => Err(AdapterError::new(
                ws_types::ErrorLevel::Error,
                format!("plex request failed: {}", req.url),
            )
            .with_http(response.status, String::from_utf8_lossy(&response.body).into_owned())),
            ws_queue::QueueOutcome::Failed { error, .. } => {
                Err(AdapterError::transient(error.message).with_context("tag", &req.tag))
            }
            ws_queue::QueueOutcome::Cancelled { .. } => Err(AdapterError::transient("request cancelled")),
        }
    }

    /// Extract `guids: Vec<"source://id">` entries into a validated map.
    fn extract_guids(item: &Value) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(entries) = item.get("Guid").and_then(Value::as_array) {
            for entry in entries {
                if let Some(raw) = entry.get("id").and_then(Value::as_str) {
                    if let Some((source, value)) = raw.split_once("://") {
                        push_validated(&mut out, source, value);
                    }
                }
            }
        }
        out
    }

    fn to_state(&self, item: &Value) -> Response<State> {
        let kind = match item.get("type").and_then(Value::as_str) {
            Some("movie") => MediaKind::Movie,
            Some("episode") => MediaKind::Episode,
            Some("show") => MediaKind::Show,
            other => {
                return Err(AdapterError::validation(format!(
                    "unsupported plex item type: {other:?}"
                )))
            }
        };

        let guids = Self::extract_guids(item);
        let title = item.get("title").and_then(Value::as_str).map(str::to_owned);
        let year = item.get("year").and_then(Value::as_i64).map(|y| y as i32);
        let season = item.get("parentIndex").and_then(Value::as_u64).map(|n| n as u32);
        let episode = item.get("index").and_then(Value::as_u64).map(|n| n as u32);

        let view_count = item.get("viewCount").and_then(Value::as_u64).unwrap_or(0);
        let watched = view_count > 0;
        let view_offset = item.get("viewOffset").and_then(Value::as_u64);
        let last_viewed = item
            .get("lastViewedAt")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| Utc::now().timestamp());

        let remote_id = item
            .get("ratingKey")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::validation("plex item missing ratingKey"))?
            .to_owned();
        let library_id = item
            .get("librarySectionID")
            .map(|v| v.to_string())
            .unwrap_or_default();

        let meta = Metadata {
            library_id,
            remote_id,
            path: item
                .get("Media")
                .and_then(|m| m.get(0))
                .and_then(|m| m.get("Part"))
                .and_then(|p| p.get(0))
                .and_then(|p| p.get("file"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            added_at: item
                .get("addedAt")
                .and_then(Value::as_i64)
                .and_then(|t| chrono::DateTime::from_timestamp(t, 0)),
            played_at: chrono::DateTime::from_timestamp(last_viewed, 0),
            watched,
            progress_ms: view_offset,
            extra: item
                .get("grandparentRatingKey")
                .and_then(Value::as_str)
                .map(|id| serde_json::json!({ "parent_remote_id": id }))
                .unwrap_or(Value::Null),
        };

        Ok(State::new(
            kind, "plex", title, year, season, episode, guids, meta, watched, last_viewed,
            view_offset, false,
        ))
    }
}

#[derive(Deserialize)]
struct PlexWebhookPayload {
    event: String,
    #[serde(rename = "Account")]
    account: Option<PlexAccount>,
    #[serde(rename = "Server")]
    server: Option<PlexServer>,
    #[serde(rename = "Metadata")]
    metadata: Value,
}

#[derive(Deserialize)]
struct PlexAccount {
    id: Option<Value>,
}

#[derive(Deserialize)]
struct PlexServer {
    uuid: Option<String>,
}

fn extract_multipart_json(content_type: &str, body: &[u8]) -> Response<Value> {
    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .ok_or_else(|| AdapterError::validation("plex webhook missing multipart boundary"))?
        .trim_matches('"');
    let body_str = String::from_utf8_lossy(body);
    let marker = format!("--{boundary}");
    for part in body_str.split(marker.as_str()) {
        if part.contains("name=\"payload\"") {
            if let Some(json_start) = part.find("\r\n\r\n").or_else(|| part.find("\n\n")) {
                let offset = if part[json_start..].starts_with("\r\n\r\n") { 4 } else { 2 };
                let json_text = part[json_start + offset..].trim();
                return serde_json::from_str(json_text)
                    .map_err(|e| AdapterError::validation(format!("invalid plex webhook json: {e}")));
            }
        }
    }
    Err(AdapterError::validation("plex webhook payload part not found"))
}

#[async_trait]
impl crate::adapter::BackendAdapter for PlexAdapter {
    fn name(&self) -> &str {
        "plex"
    }

    async fn list_libraries(&self, ctx: &Context) -> Response<Vec<Library>> {
        let req = self.auth_request(ctx, reqwest::Method::GET, "/library/sections", "plex.list_libraries");
        let body = self.call(&req).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid plex sections payload: {e}")))?;
        let entries = v
            .get("MediaContainer")
            .and_then(|m| m.get("Directory"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let libs = entries
            .into_iter()
            .map(|d| {
                let kind = match d.get("type").and_then(Value::as_str) {
                    Some("movie") => LibraryKind::Movies,
                    Some("show") => LibraryKind::TvShows,
                    other => LibraryKind::Other(other.unwrap_or("unknown").to_owned()),
                };
                Library {
                    id: d.get("key").and_then(Value::as_str).unwrap_or_default().to_owned(),
                    title: d.get("title").and_then(Value::as_str).unwrap_or_default().to_owned(),
                    kind,
                }
            })
            .collect();
        Ok(libs)
    }

    async fn get_library_page(&self, ctx: &Context, req: &PageRequest, queue: &Queue) -> Response<RawPage> {
        let path = format!(
            "/library/sections/{}/all?X-Plex-Container-Start={}&X-Plex-Container-Size={}",
            req.library_id, req.offset, req.limit
        );
        let request = self.auth_request(ctx, reqwest::Method::GET, &path, "plex.page");
        let body = self.call_via_queue(queue, request).await?;
        let total = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|v| v.get("MediaContainer").and_then(|m| m.get("totalSize")).and_then(Value::as_u64))
            .map(|n| n as u32);
        Ok(RawPage { body, total })
    }

    async fn get_metadata(&self, ctx: &Context, remote_id: &str) -> Response<RawItem> {
        let path = format!("/library/metadata/{remote_id}");
        let request = self.auth_request(ctx, reqwest::Method::GET, &path, "plex.metadata");
        let body = self.call(&request).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid plex metadata payload: {e}")))?;
        let item = v
            .get("MediaContainer")
            .and_then(|m| m.get("Metadata"))
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .cloned()
            .ok_or_else(|| AdapterError::validation("plex metadata response empty"))?;
        Ok(RawItem::new(item))
    }

    fn to_states(&self, _ctx: &Context, raw: &RawItem) -> Response<Vec<State>> {
        Ok(vec![self.to_state(&raw.value)?])
    }

    fn parse_webhook(&self, _ctx: &Context, req: &WebhookRequest) -> Response<State> {
        let payload_json = extract_multipart_json(&req.content_type, &req.body)?;
        let payload: PlexWebhookPayload = serde_json::from_value(payload_json)
            .map_err(|e| AdapterError::validation(format!("invalid plex webhook shape: {e}")))?;

        let mut state = self.to_state(&payload.metadata)?;
        state.watched = matches!(payload.event.as_str(), "media.scrobble");
        state.tainted = matches!(payload.event.as_str(), "media.play" | "media.pause" | "media.resume");
        state.updated = Utc::now().timestamp();
        let _ = (&payload.account, &payload.server);
        Ok(state)
    }

    fn inspect_request(&self, _ctx: &Context, req: &WebhookRequest) -> Response<RequestAttributes> {
        let payload_json = extract_multipart_json(&req.content_type, &req.body)?;
        let payload: PlexWebhookPayload = serde_json::from_value(payload_json)
            .map_err(|e| AdapterError::validation(format!("invalid plex webhook shape: {e}")))?;
        Ok(RequestAttributes {
            user_id: payload.account.and_then(|a| a.id).map(|v| v.to_string()),
            backend_id: payload.server.and_then(|s| s.uuid),
        })
    }

    async fn push(&self, ctx: &Context, states: &[State], queue: &mut Queue) -> Response<()> {
        for state in states {
            let Some(meta) = state.metadata.get("plex") else { continue };
            let verb = if state.watched { "scrobble" } else { "unscrobble" };
            let path = format!(
                "/:/{verb}?identifier=com.plexapp.plugins.library&key={}",
                meta.remote_id
            );
            queue.submit(self.auth_request(ctx, reqwest::Method::GET, &path, "plex.push"));
        }
        Ok(())
    }

    async fn progress(&self, ctx: &Context, states: &[State], queue: &mut Queue) -> Response<()> {
        for state in states {
            let Some(meta) = state.metadata.get("plex") else { continue };
            let Some(progress) = meta.progress_ms else { continue };
            let path = format!(
                "/:/progress?key={}&time={}&state=playing&identifier=com.plexapp.plugins.library",
                meta.remote_id, progress
            );
            queue.submit(self.auth_request(ctx, reqwest::Method::GET, &path, "plex.progress"));
        }
        Ok(())
    }

    async fn search(&self, ctx: &Context, query: &str, limit: u32) -> Response<Vec<RawItem>> {
        let path = format!("/library/search?query={}&limit={limit}", urlencode(query));
        let request = self.auth_request(ctx, reqwest::Method::GET, &path, "plex.search");
        let body = self.call(&request).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid plex search payload: {e}")))?;
        Ok(v
            .get("MediaContainer")
            .and_then(|m| m.get("Metadata"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(RawItem::new)
            .collect())
    }

    async fn search_by_id(&self, ctx: &Context, remote_id: &str) -> Response<Vec<RawItem>> {
        self.get_metadata(ctx, remote_id).await.map(|item| vec![item])
    }

    async fn get_identifier(&self, ctx: &Context, _force_refresh: bool) -> Response<String> {
        let request = self.auth_request(ctx, reqwest::Method::GET, "/", "plex.identity");
        let body = self.call(&request).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid plex identity payload: {e}")))?;
        v.get("MediaContainer")
            .and_then(|m| m.get("machineIdentifier"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| AdapterError::validation("plex identity missing machineIdentifier"))
    }

    async fn list_users(&self, ctx: &Context) -> Response<Vec<BackendUser>> {
        let request = self.auth_request(ctx, reqwest::Method::GET, "/accounts", "plex.users");
        let body = self.call(&request).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid plex accounts payload: {e}")))?;
        Ok(v
            .get("MediaContainer")
            .and_then(|m| m.get("Account"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|a| BackendUser {
                id: a.get("id").map(|v| v.to_string()).unwrap_or_default(),
                name: a.get("name").and_then(Value::as_str).unwrap_or_default().to_owned(),
            })
            .collect())
    }

    async fn get_version(&self, ctx: &Context) -> Response<Version> {
        let request = self.auth_request(ctx, reqwest::Method::GET, "/", "plex.version");
        let body = self.call(&request).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid plex identity payload: {e}")))?;
        let raw = v
            .get("MediaContainer")
            .and_then(|m| m.get("version"))
            .and_then(Value::as_str)
            .unwrap_or("0.0.0");
        let trimmed = raw.split('-').next().unwrap_or(raw);
        Version::parse(trimmed).map_err(|e| AdapterError::validation(format!("unparseable plex version: {e}")))
    }
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_guids_from_plex_array() {
        let item = serde_json::json!({
            "type": "movie",
            "ratingKey": "123",
            "title": "Dune",
            "year": 2021,
            "viewCount": 1,
            "Guid": [{"id": "imdb://tt1160419"}, {"id": "tvdb://438931"}],
        });
        let guids = PlexAdapter::extract_guids(&item);
        assert_eq!(guids.get("imdb"), Some(&"tt1160419".to_string()));
        assert_eq!(guids.get("tvdb"), Some(&"438931".to_string()));
    }

    #[test]
    fn multipart_payload_extracted() {
        let body = b"--BOUNDARY\r\nContent-Disposition: form-data; name=\"payload\"\r\n\r\n{\"event\":\"media.scrobble\",\"Metadata\":{}}\r\n--BOUNDARY--";
        let v = extract_multipart_json("multipart/form-data; boundary=BOUNDARY", body).unwrap();
        assert_eq!(v.get("event").unwrap(), "media.scrobble");
    }
}
