use std::{hint::black_box, sync::Arc};

use criterion::{Criterion, criterion_group, criterion_main};
use tagbind::{Annotation, BindingEngine, MemoryTree, MethodDecl, ValueType, View, ViewInterface};

fn widget() -> Arc<ViewInterface> {
    ViewInterface::builder("Widget")
        .tag("widget")
        .method(MethodDecl::getter("getName", ValueType::text()))
        .method(MethodDecl::getter("getCount", ValueType::of::<i32>()))
        .method(
            MethodDecl::getter("getChildren", ValueType::views_named("Widget"))
                .with(Annotation::sub_tag_list("widget")),
        )
        .build()
}

fn document(children: usize) -> String {
    let mut xml = String::from(r#"<widget name="root" count="0">"#);
    for i in 0..children {
        xml.push_str(&format!(r#"<widget name="w{i}" count="{i}"/>"#));
    }
    xml.push_str("</widget>");
    xml
}

fn bench_reads(c: &mut Criterion) {
    let tree = Arc::new(MemoryTree::parse("bench.xml", &document(256)).unwrap());
    let binding = BindingEngine::new().bind(tree.clone());
    let root = binding.root_view(&widget()).unwrap();

    c.bench_function("cached_scalar_read", |b| {
        b.iter(|| black_box(root.get::<i32>("getCount").unwrap()))
    });

    c.bench_function("collection_walk", |b| {
        b.iter(|| {
            let children: Vec<View> = root.children("getChildren").unwrap();
            let total: i32 = children
                .iter()
                .map(|child| child.get::<i32>("getCount").unwrap().unwrap_or(0))
                .sum();
            black_box(total)
        })
    });

    c.bench_function("read_after_write", |b| {
        let key = tree.root_key().unwrap();
        b.iter(|| {
            tree.write(|| tagbind::TreeProvider::set_text(tree.as_ref(), key, Some("x")))
                .unwrap();
            black_box(root.get::<i32>("getCount").unwrap())
        })
    });
}

fn bench_rebuild(c: &mut Criterion) {
    let xml = document(64);
    let tree = Arc::new(MemoryTree::parse("bench.xml", &xml).unwrap());
    let binding = BindingEngine::new().bind(tree.clone());
    let interface = widget();

    c.bench_function("reparse_and_rebind", |b| {
        b.iter(|| {
            tree.reparse(&xml).unwrap();
            let root = binding.root_view(&interface).unwrap();
            black_box(root.children::<View>("getChildren").unwrap().len())
        })
    });
}

criterion_group!(benches, bench_reads, bench_rebuild);
criterion_main!(benches);
