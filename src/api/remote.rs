//! Purpose: `RemoteCallGateway` over the JSON `/v0` bridge protocol.
//! Exports: `HttpGateway`.
//! Role: Blocking HTTP transport used by the CLI and the end-to-end tests.
//! Invariants: Request and response bodies are the types in `api::wire`.
//! Invariants: Connection failures are `Transport`; bridge errors keep their kind and host messages.
#![allow(clippy::result_large_err)]

use super::gateway::{
    ApiResult, FetchRequest, OpenListRequest, OpenedList, ReceiveRequest, RemoteCallGateway,
    RemoveRequest, ReplyRequest, SendRequest,
};
use super::wire::{
    DoneBody, ErrorEnvelope, FetchBody, FetchedBody, KeyBody, ListInfoBody, OpenListBody,
    OpenedListBody, ReceiveBody, RecordBody, RemoveBody, ReplyBody, SendBody,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::fetch::FetchedPage;
use crate::core::list_info::ListInfo;
use crate::core::token::{ListHandle, MessageKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::BufReader;
use std::time::Duration;
use url::Url;

#[derive(Clone)]
pub struct HttpGateway {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .build();
        Ok(Self {
            base_url,
            token: None,
            agent,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn post<T, R>(&self, segments: &[&str], body: &T) -> ApiResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        self.request_json("POST", segments, Some(body))
    }

    fn request_json<T, R>(&self, method: &str, segments: &[&str], body: Option<&T>) -> ApiResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let url = build_url(&self.base_url, segments)?;
        let mut request = self
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        let response = match body {
            None => request.call(),
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transport)
                .with_message(format!("request to {url} failed"))
                .with_hint("Check that the bridge is running and --url points at it.")
                .with_source(err)),
        }
    }
}

impl RemoteCallGateway for HttpGateway {
    fn open_list(&self, request: &OpenListRequest) -> ApiResult<OpenedList> {
        let body: OpenedListBody =
            self.post(&["v0", "lists", "open"], &OpenListBody::from_request(request))?;
        body.into_opened()
    }

    fn list_length(&self, handle: ListHandle) -> ApiResult<ListInfo> {
        let handle = handle.to_string();
        let body: ListInfoBody = self.post(
            &["v0", "lists", handle.as_str(), "length"],
            &DoneBody::default(),
        )?;
        ListInfo::decode(&body.info)
    }

    fn fetch_entries(&self, request: &FetchRequest) -> ApiResult<FetchedPage> {
        let handle = request.handle.to_string();
        let body: FetchedBody = self.post(
            &["v0", "lists", handle.as_str(), "entries"],
            &FetchBody::from_request(request),
        )?;
        body.into_page()
    }

    fn close_list(&self, handle: ListHandle) -> ApiResult<()> {
        let handle = handle.to_string();
        let _: DoneBody =
            self.request_json::<DoneBody, _>("DELETE", &["v0", "lists", handle.as_str()], None)?;
        Ok(())
    }

    fn receive_one(&self, request: &ReceiveRequest) -> ApiResult<Vec<u8>> {
        let body: RecordBody = self.post(&["v0", "receive"], &ReceiveBody::from_request(request))?;
        Ok(body.record)
    }

    fn send_message(&self, request: &SendRequest) -> ApiResult<MessageKey> {
        let body: KeyBody = self.post(&["v0", "send"], &SendBody::from_request(request))?;
        body.key.parse()
    }

    fn send_reply(&self, request: &ReplyRequest) -> ApiResult<()> {
        let _: DoneBody = self.post(&["v0", "reply"], &ReplyBody::from_request(request))?;
        Ok(())
    }

    fn remove_messages(&self, request: &RemoveRequest) -> ApiResult<()> {
        let _: DoneBody = self.post(&["v0", "remove"], &RemoveBody::from_request(request))?;
        Ok(())
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bridge base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("bridge base url must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(
            Error::new(ErrorKind::Usage).with_message("bridge base url must not include a path")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("bridge base url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let reader = BufReader::new(response.into_reader());
    serde_json::from_reader(reader).map_err(|err| {
        let message = if err.is_io() {
            "failed to read response body"
        } else {
            "invalid response json"
        };
        Error::new(ErrorKind::Transport)
            .with_message(message)
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return envelope.error.into_error();
    }
    Error::new(error_kind_from_status(status)).with_message(format!("bridge error status {status}"))
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 422 => ErrorKind::Usage,
        409 | 423 => ErrorKind::ListStatus,
        500 => ErrorKind::Internal,
        _ => ErrorKind::Transport,
    }
}
