// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Headless Chromium session over the DevTools protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{self, ContinueRequestParams, EventRequestPaused};
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams, RequestId, Response,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::capture::BrowserSession;
use crate::config::CaptureConfig;
use crate::correlate::ExchangeObserver;
use crate::error::BrowserError;
use crate::model::{Headers, RemoteEndpoint, RequestRecord, ResponseRecord, Timing};

const IDLE_POLL: Duration = Duration::from_millis(50);

impl From<CdpError> for BrowserError {
    fn from(err: CdpError) -> Self {
        BrowserError::new(err.to_string())
    }
}

/// How a request ended on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Finished,
    Failed,
}

/// A response whose request has ended, ready to be reported.
#[derive(Debug)]
struct Completed {
    url: String,
    record: ResponseRecord,
    /// Only requests that finished loading have a body to fetch.
    fetch_body: bool,
}

/// Network state shared between the event task and the body fetches.
///
/// `responseReceived` and `loadingFinished`/`loadingFailed` arrive on separate
/// subscriptions, so either may be seen first. A response is completed by
/// whichever of the two comes second.
struct NetworkState {
    in_flight: usize,
    fetching: usize,
    last_activity: Instant,
    // Responses waiting for their request to end, by request ID.
    pending: HashMap<String, (String, ResponseRecord)>,
    // Requests that ended before their response was seen.
    settled: HashMap<String, Settled>,
}

impl NetworkState {
    fn new() -> Self {
        NetworkState {
            in_flight: 0,
            fetching: 0,
            last_activity: Instant::now(),
            pending: HashMap::new(),
            settled: HashMap::new(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn request_started(&mut self) {
        self.in_flight += 1;
        self.touch();
    }

    fn response_received(&mut self, id: String, url: String, record: ResponseRecord) -> Option<Completed> {
        self.touch();
        match self.settled.remove(&id) {
            Some(how) => Some(self.complete(url, record, how)),
            None => {
                self.pending.insert(id, (url, record));
                None
            }
        }
    }

    fn request_settled(&mut self, id: &str, how: Settled) -> Option<Completed> {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.touch();
        match self.pending.remove(id) {
            Some((url, record)) => Some(self.complete(url, record, how)),
            None => {
                self.settled.insert(id.to_string(), how);
                None
            }
        }
    }

    fn complete(&mut self, url: String, record: ResponseRecord, how: Settled) -> Completed {
        let fetch_body = how == Settled::Finished;
        if fetch_body {
            self.fetching += 1;
        }
        Completed { url, record, fetch_body }
    }

    fn body_fetched(&mut self) {
        self.fetching = self.fetching.saturating_sub(1);
        self.touch();
    }

    fn is_idle(&self, quiet: Duration) -> bool {
        self.in_flight == 0 && self.fetching == 0 && self.last_activity.elapsed() >= quiet
    }

    /// Responses whose request never ended.
    fn take_pending(&mut self) -> Vec<(String, ResponseRecord)> {
        self.pending.drain().map(|(_, pending)| pending).collect()
    }
}

enum NetworkEvent {
    Request(Arc<EventRequestWillBeSent>),
    Response(Arc<EventResponseReceived>),
    Finished(Arc<EventLoadingFinished>),
    Failed(Arc<EventLoadingFailed>),
}

/// A single Chromium page driven through chromiumoxide.
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    network_idle: Duration,
    state: Arc<Mutex<NetworkState>>,
    observer: Option<Arc<dyn ExchangeObserver>>,
    listeners: Vec<JoinHandle<()>>,
}

impl ChromiumSession {
    /// Launch a headless browser with one blank page.
    pub async fn launch(config: &CaptureConfig) -> Result<Self, BrowserError> {
        let browser_config = BrowserConfig::builder()
            .request_timeout(config.navigation_timeout)
            .build()
            .map_err(BrowserError::new)?;
        let (browser, mut handler) = Browser::launch(browser_config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "browser handler stopped");
                    break;
                }
            }
        });
        let page = browser.new_page("about:blank").await?;

        Ok(ChromiumSession {
            browser,
            handler,
            page,
            network_idle: config.network_idle,
            state: Arc::new(Mutex::new(NetworkState::new())),
            observer: None,
            listeners: Vec::new(),
        })
    }

    async fn wait_for_network_idle(&self) {
        loop {
            tokio::time::sleep(IDLE_POLL).await;
            if self.state.lock().is_idle(self.network_idle) {
                return;
            }
        }
    }

    /// Handle all Network domain events on one task, in arrival order per subscription.
    async fn listen_network(&mut self, observer: Arc<dyn ExchangeObserver>) -> Result<(), BrowserError> {
        let requests = self.page.event_listener::<EventRequestWillBeSent>().await?;
        let responses = self.page.event_listener::<EventResponseReceived>().await?;
        let finished = self.page.event_listener::<EventLoadingFinished>().await?;
        let failed = self.page.event_listener::<EventLoadingFailed>().await?;
        let mut events = futures::stream::select_all([
            requests.map(NetworkEvent::Request).boxed(),
            responses.map(NetworkEvent::Response).boxed(),
            finished.map(NetworkEvent::Finished).boxed(),
            failed.map(NetworkEvent::Failed).boxed(),
        ]);

        let state = Arc::clone(&self.state);
        let page = self.page.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let (request_id, completed) = match event {
                    NetworkEvent::Request(event) => {
                        request_will_be_sent(&event, &state, observer.as_ref());
                        continue;
                    }
                    NetworkEvent::Response(event) => {
                        let id = event.request_id.inner().clone();
                        let record = response_record(&id, &event.response);
                        let completed = state.lock().response_received(id, event.response.url.clone(), record);
                        (event.request_id.clone(), completed)
                    }
                    NetworkEvent::Finished(event) => {
                        let completed = state.lock().request_settled(event.request_id.inner(), Settled::Finished);
                        (event.request_id.clone(), completed)
                    }
                    NetworkEvent::Failed(event) => {
                        debug!(id = %event.request_id.inner(), error = %event.error_text, "request failed");
                        let completed = state.lock().request_settled(event.request_id.inner(), Settled::Failed);
                        (event.request_id.clone(), completed)
                    }
                };
                let Some(completed) = completed else {
                    continue;
                };
                if !completed.fetch_body {
                    observer.on_response_received(&completed.url, completed.record);
                    continue;
                }
                let (page, state, observer) = (page.clone(), Arc::clone(&state), Arc::clone(&observer));
                tokio::spawn(async move {
                    let Completed { url, mut record, .. } = completed;
                    record.body = fetch_body(&page, request_id, &url).await;
                    observer.on_response_received(&url, record);
                    state.lock().body_fetched();
                });
            }
        }));
        Ok(())
    }

    async fn continue_paused_requests(&mut self) -> Result<(), BrowserError> {
        let mut events = self.page.event_listener::<EventRequestPaused>().await?;
        let page = self.page.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(err) = page.execute(ContinueRequestParams::new(event.request_id.clone())).await {
                    warn!(url = %event.request.url, error = %err, "could not continue intercepted request");
                }
            }
        }));
        Ok(())
    }

    /// Report responses whose request never ended, without a body.
    fn flush_pending(&self) {
        let Some(observer) = &self.observer else {
            return;
        };
        let pending = self.state.lock().take_pending();
        for (url, record) in pending {
            debug!(url = %url, id = %record.id, "request still open, reporting response without body");
            observer.on_response_received(&url, record);
        }
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn observe(&mut self, observer: Arc<dyn ExchangeObserver>) -> Result<(), BrowserError> {
        self.observer = Some(Arc::clone(&observer));
        self.listen_network(observer).await?;
        self.continue_paused_requests().await?;

        self.page.execute(network::EnableParams::default()).await?;
        self.page.execute(fetch::EnableParams::default()).await?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.page.goto(url).await?;
        self.wait_for_network_idle().await;
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        let params = ScreenshotParams::builder().full_page(true).build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        Ok(self.page.content().await?)
    }

    async fn close(mut self) -> Result<(), BrowserError> {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        self.flush_pending();
        let closed = self.browser.close().await;
        if let Err(err) = self.browser.wait().await {
            debug!(error = %err, "browser process did not exit cleanly");
        }
        self.handler.abort();
        closed?;
        Ok(())
    }
}

fn request_will_be_sent(event: &EventRequestWillBeSent, state: &Mutex<NetworkState>, observer: &dyn ExchangeObserver) {
    let id = event.request_id.inner().clone();
    // A redirect reuses the request ID; the hop's response has no body.
    if let Some(redirect) = &event.redirect_response {
        observer.on_response_received(&redirect.url, response_record(&id, redirect));
        state.lock().touch();
    } else {
        state.lock().request_started();
    }

    let request = RequestRecord {
        id,
        method: event.request.method.clone(),
        headers: headers(event.request.headers.inner()),
        body: event.request.post_data.clone().map(String::into_bytes),
        timestamp: wall_time(*event.wall_time.inner()),
    };
    observer.on_request_started(&event.request.url, request);
}

async fn fetch_body(page: &Page, request_id: RequestId, url: &str) -> Option<Vec<u8>> {
    match page.execute(GetResponseBodyParams::new(request_id)).await {
        Ok(body) if body.base64_encoded => match BASE64.decode(&body.body) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                debug!(url, error = %err, "undecodable response body");
                None
            }
        },
        Ok(body) => Some(body.body.clone().into_bytes()),
        Err(err) => {
            debug!(url, error = %err, "response body unavailable");
            None
        }
    }
}

fn response_record(id: &str, response: &Response) -> ResponseRecord {
    let remote = (response.remote_ip_address.is_some() || response.remote_port.is_some()).then(|| RemoteEndpoint {
        ip: response.remote_ip_address.clone(),
        port: response.remote_port.and_then(|port| u16::try_from(port).ok()),
    });
    let timing = response
        .timing
        .as_ref()
        .and_then(|timing| serde_json::to_value(timing).ok())
        .and_then(|value| serde_json::from_value::<Timing>(value).ok());

    ResponseRecord {
        id: id.to_string(),
        status: u16::try_from(response.status).unwrap_or_default(),
        headers: headers(response.headers.inner()),
        body: None,
        remote,
        timing,
        timestamp: Utc::now(),
    }
}

fn headers(value: &serde_json::Value) -> Headers {
    let Some(object) = value.as_object() else {
        return Headers::new();
    };
    object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn wall_time(seconds: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((seconds * 1_000_000.0) as i64).unwrap_or_else(Utc::now)
}
