//! Positional handler parameters and where their values come from.

use crate::auth::RestUser;
use crate::context::HttpContext;
use crate::error::HandlerError;
use crate::problem::ProblemDetails;
use http::StatusCode;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

type BodyDecoder = Arc<dyn Fn(&[u8]) -> Result<Box<dyn Any + Send>, String> + Send + Sync>;

/// Where one handler parameter is read from.
#[derive(Clone)]
pub enum ParamSource {
    Path(String),
    /// First value of a query parameter.
    Query { name: String, required: bool, default: Option<String> },
    /// Every value of a query parameter, possibly none.
    QueryAll(String),
    Header { name: String, required: bool },
    /// The request body decoded as JSON into a concrete type.
    Body(BodyDecoder),
    /// The authenticated user. Binding fails with 401 when the request has none.
    User,
    Hint(String),
}

impl fmt::Debug for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(name) => f.debug_tuple("Path").field(name).finish(),
            Self::Query { name, required, default } => {
                f.debug_struct("Query").field("name", name).field("required", required).field("default", default).finish()
            }
            Self::QueryAll(name) => f.debug_tuple("QueryAll").field(name).finish(),
            Self::Header { name, required } => f.debug_struct("Header").field("name", name).field("required", required).finish(),
            Self::Body(_) => f.write_str("Body"),
            Self::User => f.write_str("User"),
            Self::Hint(key) => f.debug_tuple("Hint").field(key).finish(),
        }
    }
}

impl ParamSource {
    pub fn path(name: impl Into<String>) -> Self {
        Self::Path(name.into())
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::Query { name: name.into(), required: true, default: None }
    }

    /// A query parameter that may be missing, replaced by `default` if one is given.
    pub fn optional_query(name: impl Into<String>, default: Option<&str>) -> Self {
        Self::Query { name: name.into(), required: false, default: default.map(str::to_owned) }
    }

    pub fn all_query(name: impl Into<String>) -> Self {
        Self::QueryAll(name.into())
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::Header { name: name.into(), required: true }
    }

    pub fn optional_header(name: impl Into<String>) -> Self {
        Self::Header { name: name.into(), required: false }
    }

    pub fn body<T>() -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        Self::validated_body::<T, _>(|_| Ok(()))
    }

    /// A JSON body that must also pass `validator`.
    pub fn validated_body<T, V>(validator: V) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        V: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::Body(Arc::new(move |bytes: &[u8]| -> Result<Box<dyn Any + Send>, String> {
            let value: T = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
            validator(&value)?;
            Ok(Box::new(value))
        }))
    }

    pub fn user() -> Self {
        Self::User
    }

    pub fn hint(key: impl Into<String>) -> Self {
        Self::Hint(key.into())
    }

    fn bind(&self, ctx: &HttpContext) -> Result<Bound, ProblemDetails> {
        let bound = match self {
            Self::Path(name) => match ctx.path_param(name) {
                Some(value) => Bound::Text(value.to_owned()),
                None => return Err(invalid(format!("missing path parameter {name}"))),
            },
            Self::Query { name, required, default } => match ctx.query_param(name).map(str::to_owned).or_else(|| default.clone()) {
                Some(value) => Bound::Text(value),
                None if *required => return Err(invalid(format!("missing query parameter {name}"))),
                None => Bound::Missing,
            },
            Self::QueryAll(name) => Bound::List(ctx.query_params(name).into_iter().map(str::to_owned).collect()),
            Self::Header { name, required } => match ctx.header(name.as_str()) {
                Some(value) => Bound::Text(value.to_owned()),
                None if *required => return Err(invalid(format!("missing header {name}"))),
                None => Bound::Missing,
            },
            Self::Body(decode) => {
                if ctx.body().is_empty() {
                    return Err(invalid("missing request body"));
                }
                Bound::Value(decode(ctx.body()).map_err(|e| invalid(format!("invalid request body: {e}")))?)
            }
            Self::User => match ctx.user() {
                Some(user) => Bound::User(Arc::clone(user)),
                None => {
                    return Err(ProblemDetails::new(StatusCode::UNAUTHORIZED, "missing-authentication")
                        .detail("the handler needs an authenticated user"));
                }
            },
            Self::Hint(key) => ctx.hint(key).map_or(Bound::Missing, |value| Bound::Text(value.to_owned())),
        };
        Ok(bound)
    }
}

fn invalid(detail: impl Into<String>) -> ProblemDetails {
    ProblemDetails::bad_request("invalid-parameter", detail)
}

/// Binds every source in order; the first failure answers 400, or 401 for a missing user.
pub fn bind(ctx: &HttpContext, sources: &[ParamSource]) -> Result<BoundParams, HandlerError> {
    let values = sources.iter().map(|source| source.bind(ctx)).collect::<Result<Vec<_>, _>>()?;
    Ok(BoundParams { values })
}

enum Bound {
    Missing,
    Text(String),
    List(Vec<String>),
    Value(Box<dyn Any + Send>),
    User(Arc<dyn RestUser>),
}

/// The values bound for one invocation, addressed by the position of their source.
#[derive(Default)]
pub struct BoundParams {
    values: Vec<Bound>,
}

impl fmt::Debug for BoundParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundParams").field("len", &self.values.len()).finish()
    }
}

impl BoundParams {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        match self.values.get(index)? {
            Bound::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn list(&self, index: usize) -> &[String] {
        match self.values.get(index) {
            Some(Bound::List(values)) => values,
            _ => &[],
        }
    }

    pub fn user(&self, index: usize) -> Option<Arc<dyn RestUser>> {
        match self.values.get(index)? {
            Bound::User(user) => Some(Arc::clone(user)),
            _ => None,
        }
    }

    /// Moves a decoded body out. Returns `None` if the position holds no value of type `T`
    /// or it was taken already.
    pub fn take<T: 'static>(&mut self, index: usize) -> Option<T> {
        let slot = self.values.get_mut(index)?;
        match std::mem::replace(slot, Bound::Missing) {
            Bound::Value(value) => match value.downcast::<T>() {
                Ok(value) => Some(*value),
                Err(value) => {
                    *slot = Bound::Value(value);
                    None
                }
            },
            other => {
                *slot = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SimpleRestUser;
    use bytes::Bytes;
    use http::Request;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct CreateGroup {
        name: String,
        #[serde(default)]
        templates: Vec<String>,
    }

    fn context(uri: &str, body: &'static str) -> HttpContext {
        let request = Request::builder().uri(uri).header("x-request-id", "42").body(Bytes::from_static(body.as_bytes())).unwrap();
        let mut ctx = HttpContext::from_request(request);
        ctx.set_path_params(vec![("name".to_owned(), "Lobby".to_owned())]);
        ctx.set_hint("audit", "group");
        ctx
    }

    #[test]
    fn binds_every_source_in_order() {
        let mut ctx = context("/api/v3/group/Lobby?node=a&node=b&limit=5", r#"{"name":"Lobby"}"#);
        ctx.set_user(Arc::new(SimpleRestUser::new("alice", ["x"])));

        let sources = [
            ParamSource::path("name"),
            ParamSource::query("limit"),
            ParamSource::optional_query("offset", Some("0")),
            ParamSource::all_query("node"),
            ParamSource::header("x-request-id"),
            ParamSource::body::<CreateGroup>(),
            ParamSource::user(),
            ParamSource::hint("audit"),
            ParamSource::optional_query("sort", None),
        ];
        let mut params = bind(&ctx, &sources).unwrap();

        assert_eq!(params.len(), 9);
        assert_eq!(params.text(0), Some("Lobby"));
        assert_eq!(params.text(1), Some("5"));
        assert_eq!(params.text(2), Some("0"));
        assert_eq!(params.list(3), ["a", "b"]);
        assert_eq!(params.text(4), Some("42"));
        assert_eq!(params.take::<CreateGroup>(5), Some(CreateGroup { name: "Lobby".to_owned(), templates: vec![] }));
        assert!(params.take::<CreateGroup>(5).is_none());
        assert_eq!(params.user(6).unwrap().id(), "alice");
        assert_eq!(params.text(7), Some("group"));
        assert!(params.text(8).is_none());
        assert!(params.text(42).is_none());
    }

    #[test]
    fn take_with_the_wrong_type_keeps_the_value() {
        let ctx = context("/", r#"{"name":"Proxy"}"#);
        let mut params = bind(&ctx, &[ParamSource::body::<CreateGroup>()]).unwrap();

        assert!(params.take::<String>(0).is_none());
        assert_eq!(params.take::<CreateGroup>(0).unwrap().name, "Proxy");
    }

    fn rejection(ctx: &HttpContext, source: ParamSource) -> StatusCode {
        match bind(ctx, &[source]) {
            Err(HandlerError::Response(response)) => response.status(),
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[test]
    fn missing_or_invalid_values_are_400() {
        let ctx = context("/", "");
        assert_eq!(rejection(&ctx, ParamSource::path("id")), StatusCode::BAD_REQUEST);
        assert_eq!(rejection(&ctx, ParamSource::query("limit")), StatusCode::BAD_REQUEST);
        assert_eq!(rejection(&ctx, ParamSource::header("authorization")), StatusCode::BAD_REQUEST);
        assert_eq!(rejection(&ctx, ParamSource::body::<CreateGroup>()), StatusCode::BAD_REQUEST);

        let ctx = context("/", r#"{"nom":"Lobby"}"#);
        assert_eq!(rejection(&ctx, ParamSource::body::<CreateGroup>()), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_user_is_401() {
        let ctx = context("/", "");
        assert_eq!(rejection(&ctx, ParamSource::user()), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn validator_runs_after_decoding() {
        let source = ParamSource::validated_body::<CreateGroup, _>(|group| {
            if group.name.len() <= 16 { Ok(()) } else { Err("name too long".to_owned()) }
        });

        let ctx = context("/", r#"{"name":"Lobby"}"#);
        assert!(bind(&ctx, std::slice::from_ref(&source)).is_ok());

        let ctx = context("/", r#"{"name":"AVeryVeryLongGroupName"}"#);
        assert_eq!(rejection(&ctx, source), StatusCode::BAD_REQUEST);
    }
}
