use bencher::{PATHS, ROUTES};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use http::Response;
use nimbus_web::auth::AuthProviderRegistry;
use nimbus_web::tree::{HandlerTree, PathNode};
use nimbus_web::{HandlerDescriptor, HandlerRegistry, ResponseBody, endpoint_fn};
use std::hint::black_box;
use std::sync::Arc;

fn tree() -> HandlerTree<()> {
    let mut tree = HandlerTree::new();
    for route in ROUTES {
        let mut node = tree.root();
        for segment in route.trim_start_matches('/').split('/') {
            let path_node = PathNode::parse(segment).expect("route segments should be valid");
            node = tree.register_child_node(node, path_node).expect("route segments should not collide");
        }
        tree.path_node_mut(node).expect("registered node should exist").handlers_mut().push(());
    }
    tree
}

fn registry() -> HandlerRegistry {
    let registry = HandlerRegistry::new(Arc::new(AuthProviderRegistry::new()));
    for route in ROUTES {
        let descriptor = HandlerDescriptor::get(*route)
            .handler(endpoint_fn(|_ctx, _params| Box::pin(async { Ok(Response::new(ResponseBody::empty())) })));
        registry.register(descriptor).expect("routes should not collide");
    }
    registry
}

fn benchmark_dispatch(criterion: &mut Criterion) {
    let tree = tree();
    let registry = registry();
    let mut group = criterion.benchmark_group("dispatch");

    for path in PATHS {
        group.bench_with_input(BenchmarkId::new("tree_find", path), path, |b, path| {
            b.iter(|| black_box(tree.find(black_box(path))));
        });
        group.bench_with_input(BenchmarkId::new("registry_find", path), path, |b, path| {
            b.iter(|| black_box(registry.find(black_box(path))));
        });
    }

    group.bench_function("registry_miss", |b| b.iter(|| black_box(registry.find(black_box("/api/v4/unknown/path")))));
    group.finish();
}

criterion_group!(dispatch, benchmark_dispatch);
criterion_main!(dispatch);
