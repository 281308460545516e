//! Shared Jellyfin/Emby core — spec §4.2: both speak the same
//! `MediaBrowser Token="…"` auth scheme and `/Users/{uid}/Items` listing
//! contract; `jellyfin.rs`/`emby.rs` are thin wrappers naming `BackendKind`
//! and (for Jellyfin) the progress-endpoint version gate.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use semver::Version;
use serde::Deserialize;
use serde_json::Value;
use ws_queue::{Queue, Request, Transport};
use ws_types::{
    AdapterError, BackendUser, ErrorLevel, Library, LibraryKind, MediaKind, Metadata, PageRequest,
    RawItem, RawPage, RequestAttributes, Response, State, WebhookRequest,
};

use crate::context::Context;
use crate::guid_extract::push_validated;

pub struct JellyfinEmbyCore {
    pub backend_name: &'static str,
    pub transport: Arc<dyn Transport>,
    /// Jellyfin's progress endpoint requires server version >= 10.9; Emby
    /// has no such gate (spec §4.2).
    pub progress_min_version: Option<Version>,
}

impl JellyfinEmbyCore {
    fn auth_request(&self, ctx: &Context, method: reqwest::Method, path: &str, tag: &str) -> Request {
        Request::new(method, format!("{}{path}", ctx.base_url), tag)
            .with_header("Authorization", format!("MediaBrowser Token=\"{}\"", ctx.token))
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
                ErrorLevel::Error,
                format!("{} request failed: {}", self.backend_name, req.url),
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
                ErrorLevel::Error,
                format!("{} request failed: {}", self.backend_name, req.url),
            )
            .with_http(response.status, String::from_utf8_lossy(&response.body).into_owned())),
            ws_queue::QueueOutcome::Failed { error, .. } => {
                Err(AdapterError::transient(error.message).with_context("tag", &req.tag))
            }
            ws_queue::QueueOutcome::Cancelled { .. } => Err(AdapterError::transient("request cancelled")),
        }
    }

    fn extract_guids(item: &Value) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(ids) = item.get("ProviderIds").and_then(Value::as_object) {
            for (source, value) in ids {
                if let Some(value) = value.as_str() {
                    push_validated(&mut out, source, value);
                }
            }
        }
        out
    }

    fn to_state(&self, item: &Value) -> Response<State> {
        let kind = match item.get("Type").and_then(Value::as_str) {
            Some("Movie") => MediaKind::Movie,
            Some("Episode") => MediaKind::Episode,
            Some("Series") => MediaKind::Show,
            other => {
                return Err(AdapterError::validation(format!(
                    "unsupported {} item type: {other:?}",
                    self.backend_name
                )))
            }
        };

        let guids = Self::extract_guids(item);
        let title = item.get("Name").and_then(Value::as_str).map(str::to_owned);
        let year = item.get("ProductionYear").and_then(Value::as_i64).map(|y| y as i32);
        let season = item.get("ParentIndexNumber").and_then(Value::as_u64).map(|n| n as u32);
        let episode = item.get("IndexNumber").and_then(Value::as_u64).map(|n| n as u32);

        let user_data = item.get("UserData");
        let watched = user_data
            .and_then(|u| u.get("Played"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let position_ticks = user_data
            .and_then(|u| u.get("PlaybackPositionTicks"))
            .and_then(Value::as_u64);
        let progress_ms = position_ticks.map(|t| t / 10_000);
        let last_played = user_data
            .and_then(|u| u.get("LastPlayedDate"))
            .and_then(Value::as_str)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let remote_id = item
            .get("Id")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::validation(format!("{} item missing Id", self.backend_name)))?
            .to_owned();

        let meta = Metadata {
            library_id: item.get("ParentId").and_then(Value::as_str).unwrap_or_default().to_owned(),
            remote_id,
            path: item.get("Path").and_then(Value::as_str).map(str::to_owned),
            added_at: item
                .get("DateCreated")
                .and_then(Value::as_str)
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            played_at: Some(last_played),
            watched,
            progress_ms,
            extra: item
                .get("SeriesId")
                .and_then(Value::as_str)
                .map(|id| serde_json::json!({ "parent_remote_id": id }))
                .unwrap_or(Value::Null),
        };

        Ok(State::new(
            kind,
            self.backend_name,
            title,
            year,
            season,
            episode,
            guids,
            meta,
            watched,
            last_played.timestamp(),
            progress_ms,
            false,
        ))
    }

    pub async fn list_libraries(&self, ctx: &Context) -> Response<Vec<Library>> {
        let path = format!("/Users/{}/Views", ctx.user_id);
        let req = self.auth_request(ctx, reqwest::Method::GET, &path, "jf_emby.list_libraries");
        let body = self.call(&req).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid {} views payload: {e}", self.backend_name)))?;
        let items = v.get("Items").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(items
            .into_iter()
            .map(|i| {
                let kind = match i.get("CollectionType").and_then(Value::as_str) {
                    Some("movies") => LibraryKind::Movies,
                    Some("tvshows") => LibraryKind::TvShows,
                    other => LibraryKind::Other(other.unwrap_or("unknown").to_owned()),
                };
                Library {
                    id: i.get("Id").and_then(Value::as_str).unwrap_or_default().to_owned(),
                    title: i.get("Name").and_then(Value::as_str).unwrap_or_default().to_owned(),
                    kind,
                }
            })
            .collect())
    }

    pub async fn get_library_page(&self, ctx: &Context, req: &PageRequest, queue: &Queue) -> Response<RawPage> {
        let path = format!(
            "/Users/{}/Items?parentId={}&recursive=true&includeItemTypes=Movie,Episode&startIndex={}&limit={}&fields=ProviderIds,Path,DateCreated",
            ctx.user_id, req.library_id, req.offset, req.limit
        );
        let request = self.auth_request(ctx, reqwest::Method::GET, &path, "jf_emby.page");
        let body = self.call_via_queue(queue, request).await?;
        let total = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|v| v.get("TotalRecordCount").and_then(Value::as_u64))
            .map(|n| n as u32);
        Ok(RawPage { body, total })
    }

    pub async fn get_metadata(&self, ctx: &Context, remote_id: &str) -> Response<RawItem> {
        let path = format!("/Users/{}/Items/{remote_id}", ctx.user_id);
        let request = self.auth_request(ctx, reqwest::Method::GET, &path, "jf_emby.metadata");
        let body = self.call(&request).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid {} item payload: {e}", self.backend_name)))?;
        Ok(RawItem::new(v))
    }

    pub fn to_states(&self, raw: &RawItem) -> Response<Vec<State>> {
        let base = self.to_state(&raw.value)?;
        Ok(expand_multi_episode(&raw.value, base))
    }

    pub fn parse_webhook(&self, req: &WebhookRequest) -> Response<State> {
        let payload: JfEmbyWebhook = serde_json::from_slice(&req.body)
            .map_err(|e| AdapterError::validation(format!("invalid {} webhook shape: {e}", self.backend_name)))?;
        let mut state = self.to_state(&payload.item)?;
        state.tainted = matches!(payload.event.as_str(), "PlaybackStart" | "PlaybackProgress");
        state.updated = Utc::now().timestamp();
        Ok(state)
    }

    pub fn inspect_request(&self, req: &WebhookRequest) -> Response<RequestAttributes> {
        let payload: JfEmbyWebhook = serde_json::from_slice(&req.body)
            .map_err(|e| AdapterError::validation(format!("invalid {} webhook shape: {e}", self.backend_name)))?;
        Ok(RequestAttributes {
            user_id: payload.user_id,
            backend_id: payload.server_id,
        })
    }

    pub async fn push(&self, ctx: &Context, states: &[State], queue: &mut Queue) -> Response<()> {
        for state in states {
            let Some(meta) = state.metadata.get(self.backend_name) else { continue };
            let method = if state.watched { reqwest::Method::POST } else { reqwest::Method::DELETE };
            let path = format!("/Users/{}/PlayedItems/{}", ctx.user_id, meta.remote_id);
            queue.submit(self.auth_request(ctx, method, &path, "jf_emby.push"));
        }
        Ok(())
    }

    pub async fn progress(&self, ctx: &Context, states: &[State], queue: &mut Queue) -> Response<()> {
        if let Some(min) = &self.progress_min_version {
            let current = self.get_version(ctx).await?;
            if &current < min {
                return Err(AdapterError::validation(format!(
                    "{} server version {current} below required {min} for progress updates",
                    self.backend_name
                )));
            }
        }
        for state in states {
            let Some(meta) = state.metadata.get(self.backend_name) else { continue };
            let Some(progress_ms) = meta.progress_ms else { continue };
            let ticks = progress_ms * 10_000;
            let path = format!(
                "/Sessions/Playing/Progress?itemId={}&positionTicks={ticks}",
                meta.remote_id
            );
            queue.submit(self.auth_request(ctx, reqwest::Method::POST, &path, "jf_emby.progress"));
        }
        Ok(())
    }

    pub async fn search(&self, ctx: &Context, query: &str, limit: u32) -> Response<Vec<RawItem>> {
        let path = format!(
            "/Users/{}/Items?searchTerm={}&limit={limit}&recursive=true&includeItemTypes=Movie,Episode",
            ctx.user_id,
            urlencode(query)
        );
        let request = self.auth_request(ctx, reqwest::Method::GET, &path, "jf_emby.search");
        let body = self.call(&request).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid {} search payload: {e}", self.backend_name)))?;
        Ok(v
            .get("Items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(RawItem::new)
            .collect())
    }

    pub async fn search_by_id(&self, ctx: &Context, remote_id: &str) -> Response<Vec<RawItem>> {
        self.get_metadata(ctx, remote_id).await.map(|item| vec![item])
    }

    pub async fn get_identifier(&self, ctx: &Context, _force_refresh: bool) -> Response<String> {
        let request = self.auth_request(ctx, reqwest::Method::GET, "/System/Info", "jf_emby.identity");
        let body = self.call(&request).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid {} system info payload: {e}", self.backend_name)))?;
        v.get("Id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| AdapterError::validation(format!("{} system info missing Id", self.backend_name)))
    }

    pub async fn list_users(&self, ctx: &Context) -> Response<Vec<BackendUser>> {
        let request = self.auth_request(ctx, reqwest::Method::GET, "/Users", "jf_emby.users");
        let body = self.call(&request).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid {} users payload: {e}", self.backend_name)))?;
        Ok(v
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|u| BackendUser {
                id: u.get("Id").and_then(Value::as_str).unwrap_or_default().to_owned(),
                name: u.get("Name").and_then(Value::as_str).unwrap_or_default().to_owned(),
            })
            .collect())
    }

    pub async fn get_version(&self, ctx: &Context) -> Response<Version> {
        let request = self.auth_request(ctx, reqwest::Method::GET, "/System/Info", "jf_emby.version");
        let body = self.call(&request).await?;
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| AdapterError::validation(format!("invalid {} system info payload: {e}", self.backend_name)))?;
        let raw = v.get("Version").and_then(Value::as_str).unwrap_or("0.0.0");
        Version::parse(raw).map_err(|e| AdapterError::validation(format!("unparseable {} version: {e}", self.backend_name)))
    }
}

#[derive(Deserialize)]
struct JfEmbyWebhook {
    #[serde(rename = "Event")]
    event: String,
    #[serde(rename = "Item")]
    item: Value,
    #[serde(rename = "UserId")]
    user_id: Option<String>,
    #[serde(rename = "ServerId")]
    server_id: Option<String>,
}

/// Spec §4.3 step 7: a `Path` file spanning multiple episode numbers
/// (`IndexNumberEnd` present and greater than `IndexNumber`) expands into
/// one `State` per episode in the range.
fn expand_multi_episode(item: &Value, base: State) -> Vec<State> {
    let start = item.get("IndexNumber").and_then(Value::as_u64);
    let end = item.get("IndexNumberEnd").and_then(Value::as_u64);
    match (start, end) {
        (Some(start), Some(end)) if end > start => (start..=end)
            .map(|ep| {
                let mut s = base.clone();
                s.episode = Some(ep as u32);
                s
            })
            .collect(),
        _ => vec![base],
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
    fn extracts_provider_ids() {
        let item = serde_json::json!({
            "Type": "Movie",
            "Id": "abc",
            "Name": "Dune",
            "ProductionYear": 2021,
            "ProviderIds": {"Imdb": "tt1160419", "Tvdb": "438931", "Letterboxd": "xyz"},
            "UserData": {"Played": true, "LastPlayedDate": "2024-05-01T12:00:00Z"},
        });
        let guids = JellyfinEmbyCore::extract_guids(&item);
        assert_eq!(guids.get("imdb"), Some(&"tt1160419".to_string()));
        assert_eq!(guids.get("tvdb"), Some(&"438931".to_string()));
        assert!(!guids.contains_key("letterboxd"));
    }

    #[test]
    fn multi_episode_file_expands() {
        let item = serde_json::json!({"IndexNumber": 1, "IndexNumberEnd": 3});
        let base = super_test_state();
        let states = expand_multi_episode(&item, base);
        assert_eq!(states.len(), 3);
        assert_eq!(states[2].episode, Some(3));
    }

    fn super_test_state() -> State {
        State::new(
            MediaKind::Episode,
            "home_jellyfin",
            Some("Ep".into()),
            None,
            Some(1),
            Some(1),
            BTreeMap::new(),
            Metadata {
                library_id: "lib".into(),
                remote_id: "1".into(),
                path: None,
                added_at: None,
                played_at: None,
                watched: false,
                progress_ms: None,
                extra: Value::Null,
            },
            false,
            0,
            None,
            false,
        )
    }
}
