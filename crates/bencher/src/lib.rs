//! Shared fixtures of the nimbus benchmarks.

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    file: TestFile,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, file: TestFile) -> Self {
        Self { name, group, file }
    }

    pub fn small(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Small, file)
    }

    pub fn large(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Large, file)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }
}

/// A raw request as it arrives on the wire.
#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Large,
}

pub static GET_SMALL: TestFile = TestFile::new("get_small.txt", include_str!("../resources/request/get_small.txt"));
pub static GET_LARGE: TestFile = TestFile::new("get_large.txt", include_str!("../resources/request/get_large.txt"));
pub static POST_CHUNKED: TestFile = TestFile::new("post_chunked.txt", include_str!("../resources/request/post_chunked.txt"));

pub fn request_cases() -> Vec<TestCase> {
    vec![TestCase::small("get_small", GET_SMALL), TestCase::large("get_large", GET_LARGE), TestCase::small("post_chunked", POST_CHUNKED)]
}

/// Route templates shaped like a real management API.
pub const ROUTES: &[&str] = &[
    "/api/v3/node",
    "/api/v3/node/{name}",
    "/api/v3/node/{name}/live",
    "/api/v3/cluster",
    "/api/v3/cluster/{node}",
    "/api/v3/group",
    "/api/v3/group/{name}",
    "/api/v3/group/{name}/templates",
    "/api/v3/task",
    "/api/v3/task/{name}",
    "/api/v3/service",
    "/api/v3/service/{id}",
    "/api/v3/service/{id}/lifecycle",
    "/api/v3/service/{id}/log/{*lines}",
    "/api/v3/service/create/task",
    "/api/v3/service/create/configuration",
    "/api/v3/template/{storage}/{prefix}/{name}/file/{*path}",
    "/api/v3/module",
    "/api/v3/module/{name}/config",
    "/api/v3/websocket/ticket",
];

/// Request paths, each matching one of [`ROUTES`].
pub const PATHS: &[&str] = &[
    "/api/v3/node",
    "/api/v3/node/Node-1/live",
    "/api/v3/group/Lobby/templates",
    "/api/v3/service/create/task",
    "/api/v3/service/Lobby-1/log/tail/200",
    "/api/v3/template/local/Lobby/default/file/plugins/config.yml",
    "/api/v3/websocket/ticket",
];
