use crate::auth::RestUser;
use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, Method, Request, Response, Uri};
use nimbus_http::protocol::body::ResponseBody;
use nimbus_http::protocol::{CancelSend, ConnectionInfo, ConnectionMeta, is_upgrade};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything one request carries through the pipeline: the aggregated request, values
/// bound from the path and query, the resolved connection info, the authenticated user and
/// the headers that will be merged into the response.
#[derive(Debug)]
pub struct HttpContext {
    request: Request<Bytes>,
    path_params: Vec<(String, String)>,
    query: Vec<(String, String)>,
    hints: HashMap<String, String>,
    connection_info: ConnectionInfo,
    user: Option<Arc<dyn RestUser>>,
    response_headers: HeaderMap,
    close_after: bool,
    cancel_send: bool,
    upgrade_requested: bool,
}

impl HttpContext {
    pub fn new(request: Request<Bytes>, connection_info: ConnectionInfo) -> Self {
        let query = request.uri().query().and_then(|query| serde_urlencoded::from_str(query).ok()).unwrap_or_default();
        let upgrade_requested = is_upgrade(request.headers());

        Self {
            request,
            path_params: Vec::new(),
            query,
            hints: HashMap::new(),
            connection_info,
            user: None,
            response_headers: HeaderMap::new(),
            close_after: false,
            cancel_send: false,
            upgrade_requested,
        }
    }

    /// A context for `request` with the base connection info of its connection.
    pub fn from_request(request: Request<Bytes>) -> Self {
        let meta = request.extensions().get::<ConnectionMeta>().cloned().unwrap_or_default();
        let info = meta.base_info(request.headers());
        Self::new(request, info)
    }

    pub fn request(&self) -> &Request<Bytes> {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.request.headers().get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    pub fn connection_meta(&self) -> Option<&ConnectionMeta> {
        self.request.extensions().get::<ConnectionMeta>()
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    pub fn set_path_params(&mut self, params: Vec<(String, String)>) {
        self.path_params = params;
    }

    /// First value of the query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Every value of the query parameter `name`, in request order.
    pub fn query_params(&self, name: &str) -> Vec<&str> {
        self.query.iter().filter(|(key, _)| key == name).map(|(_, value)| value.as_str()).collect()
    }

    pub fn hint(&self, key: &str) -> Option<&str> {
        self.hints.get(key).map(String::as_str)
    }

    pub fn set_hint(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.hints.insert(key.into(), value.into());
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }

    pub fn set_connection_info(&mut self, info: ConnectionInfo) {
        self.connection_info = info;
    }

    pub fn user(&self) -> Option<&Arc<dyn RestUser>> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: Arc<dyn RestUser>) {
        self.user = Some(user);
    }

    /// Headers added to whatever response this request ends with.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    pub fn add_response_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response_headers.append(name, value);
    }

    pub fn close_after(&self) -> bool {
        self.close_after
    }

    /// Close the connection once the response is written.
    pub fn set_close_after(&mut self, close_after: bool) {
        self.close_after = close_after;
    }

    pub fn cancel_send(&self) -> bool {
        self.cancel_send
    }

    /// Write no response at all and close the connection.
    pub fn set_cancel_send(&mut self, cancel_send: bool) {
        self.cancel_send = cancel_send;
    }

    pub fn upgrade_requested(&self) -> bool {
        self.upgrade_requested
    }

    /// Applies the pending headers and connection flags to the outgoing response.
    ///
    /// Headers the response already sets win over pending ones of the same name.
    pub fn finish(&mut self, mut response: Response<ResponseBody>) -> Response<ResponseBody> {
        let mut current = None;
        for (name, value) in std::mem::take(&mut self.response_headers) {
            if let Some(name) = name {
                current = (!response.headers().contains_key(&name)).then_some(name);
            }
            if let Some(name) = &current {
                response.headers_mut().append(name.clone(), value);
            }
        }

        if self.close_after {
            response.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        if self.cancel_send {
            response.extensions_mut().insert(CancelSend);
        }
        response
    }
}
