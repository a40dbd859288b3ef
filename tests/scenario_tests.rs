//! End-to-end tests binding typed views to an in-memory document

use std::sync::Arc;

use tagbind::{
    Annotation, BindingEngine, DocumentBinding, MemoryTree, MethodDecl, Result, TypedView,
    ValueType, View, ViewInterface,
};

#[derive(Clone, Debug, PartialEq)]
struct Widget(View);

tagbind::typed_view!(
    Widget,
    ViewInterface::builder("Widget")
        .tag("widget")
        .method(MethodDecl::getter("getName", ValueType::text()))
        .method(MethodDecl::setter("setName", ValueType::text()))
        .method(MethodDecl::getter("getCount", ValueType::of::<i32>()))
        .method(MethodDecl::setter("setCount", ValueType::of::<i32>()))
        .method(
            MethodDecl::getter("getChildren", ValueType::views::<Widget>())
                .with(Annotation::sub_tag_list("widget")),
        )
        .method(MethodDecl::adder("addWidget", ValueType::view::<Widget>()))
        .method(MethodDecl::getter("getLabel", ValueType::view::<Label>()))
        .build()
);

impl Widget {
    fn name(&self) -> Result<Option<String>> {
        self.0.get("getName")
    }

    fn count(&self) -> Result<Option<i32>> {
        self.0.get("getCount")
    }

    fn children(&self) -> Result<Vec<Widget>> {
        self.0.children("getChildren")
    }
}

#[derive(Clone, Debug)]
struct Label(View);

tagbind::typed_view!(
    Label,
    ViewInterface::builder("Label")
        .method(MethodDecl::getter("getValue", ValueType::text()))
        .method(MethodDecl::setter("setValue", ValueType::text()))
        .method(
            MethodDecl::getter("isBold", ValueType::boolean())
                .with(Annotation::sub_tag("bold"))
                .with(Annotation::Indicator),
        )
        .method(
            MethodDecl::setter("setBold", ValueType::boolean())
                .with(Annotation::sub_tag("bold"))
                .with(Annotation::Indicator),
        )
        .build()
);

const DOC: &str = r#"<widget name="A" count="3"><widget name="B"/></widget>"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn bind(xml: &str) -> (Arc<MemoryTree>, Arc<DocumentBinding>) {
    init_tracing();
    let tree = Arc::new(MemoryTree::parse("ui.xml", xml).unwrap());
    let binding = BindingEngine::new().bind(tree.clone());
    (tree, binding)
}

#[test]
fn test_widget_scenario() {
    let (_tree, binding) = bind(DOC);
    let widget: Widget = binding.root().unwrap();
    assert_eq!(widget.name().unwrap().as_deref(), Some("A"));
    assert_eq!(widget.count().unwrap(), Some(3));
    let children = widget.children().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name().unwrap().as_deref(), Some("B"));
    assert_eq!(children[0].count().unwrap(), None);
}

#[test]
fn test_same_node_same_view() {
    let (_tree, binding) = bind(DOC);
    let a: Widget = binding.root().unwrap();
    let b: Widget = binding.root().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_view().id(), b.as_view().id());
    assert_eq!(a.children().unwrap(), b.children().unwrap());
}

#[test]
fn test_setters_write_attributes() {
    let (tree, binding) = bind(DOC);
    let widget: Widget = binding.root().unwrap();
    tree.write(|| {
        widget.0.set("setName", Some("Z".to_owned())).unwrap();
        widget.0.set("setCount", Some(7i32)).unwrap();
    });
    assert_eq!(widget.name().unwrap().as_deref(), Some("Z"));
    assert_eq!(widget.count().unwrap(), Some(7));
    assert_eq!(
        tree.to_xml(),
        r#"<widget name="Z" count="7"><widget name="B"/></widget>"#
    );

    tree.write(|| widget.0.set::<i32>("setCount", None)).unwrap();
    assert_eq!(widget.count().unwrap(), None);
    assert_eq!(tree.to_xml(), r#"<widget name="Z"><widget name="B"/></widget>"#);
}

#[test]
fn test_adder_appends_child() {
    let (tree, binding) = bind(DOC);
    let widget: Widget = binding.root().unwrap();
    let added: Widget = tree.write(|| widget.0.add("addWidget")).unwrap();
    tree.write(|| added.0.set("setName", Some("C".to_owned()))).unwrap();
    let names: Vec<_> = widget
        .children()
        .unwrap()
        .iter()
        .map(|w| w.name().unwrap().unwrap())
        .collect();
    assert_eq!(names, ["B", "C"]);
}

#[test]
fn test_missing_fixed_child_is_created_on_write() {
    let (tree, binding) = bind(DOC);
    let widget: Widget = binding.root().unwrap();
    let label: Label = widget.0.child("getLabel").unwrap();
    assert!(!label.0.exists().unwrap());
    assert_eq!(label.0.get::<String>("getValue").unwrap(), None);

    tree.write(|| label.0.set("setValue", Some("hello".to_owned())))
        .unwrap();
    assert!(label.0.exists().unwrap());
    assert_eq!(
        label.0.get::<String>("getValue").unwrap().as_deref(),
        Some("hello")
    );
    assert!(tree.to_xml().contains("<label>hello</label>"));
}

#[test]
fn test_fixed_child_keeps_identity_once_created() {
    let (tree, binding) = bind(r#"<widget name="A"/>"#);
    let widget: Widget = binding.root().unwrap();
    let before: Label = widget.0.child("getLabel").unwrap();
    tree.write(|| before.0.set("setValue", Some("x".to_owned())))
        .unwrap();
    let after: Label = widget.0.child("getLabel").unwrap();
    assert_eq!(before.0.id(), after.0.id());
    assert_eq!(after.0.get::<String>("getValue").unwrap().as_deref(), Some("x"));
    assert_eq!(before.0.cached_value_count().unwrap(), 1);
}

#[test]
fn test_indicator_tracks_presence() {
    let (tree, binding) = bind(r#"<widget name="A"><label><bold/></label></widget>"#);
    let widget: Widget = binding.root().unwrap();
    let label: Label = widget.0.child("getLabel").unwrap();
    assert!(label.0.flag("isBold").unwrap());

    tree.write(|| label.0.set_flag("setBold", false)).unwrap();
    assert!(!label.0.flag("isBold").unwrap());
    assert!(!tree.to_xml().contains("bold"));

    tree.write(|| label.0.set_flag("setBold", true)).unwrap();
    assert!(label.0.flag("isBold").unwrap());
    assert!(tree.to_xml().contains("<bold/>"));
}

#[test]
fn test_views_go_stale_after_reparse() {
    let (tree, binding) = bind(DOC);
    let widget: Widget = binding.root().unwrap();
    let child = widget.children().unwrap().remove(0);
    tree.reparse(DOC).unwrap();
    assert!(!widget.as_view().is_valid());
    let err = child.name().unwrap_err();
    assert_eq!(err.code(), "STALE_HANDLE");

    let fresh: Widget = binding.root().unwrap();
    assert_eq!(fresh.name().unwrap().as_deref(), Some("A"));
    assert_ne!(fresh, widget);
    assert_eq!(binding.generation_epoch(), 1);
}

#[test]
fn test_removed_node_is_stale() {
    let (tree, binding) = bind(DOC);
    let widget: Widget = binding.root().unwrap();
    let child = widget.children().unwrap().remove(0);
    let key = match child.0.tree_node().unwrap() {
        Some(tagbind::TreeNode::Tag(key)) => key,
        other => panic!("unexpected {other:?}"),
    };
    tree.write(|| tagbind::TreeProvider::remove(tree.as_ref(), key))
        .unwrap();
    assert!(matches!(
        child.name(),
        Err(tagbind::Error::StaleHandle { .. })
    ));
    assert!(widget.children().unwrap().is_empty());
}

#[test]
fn test_typed_view_cast_checks_interface() {
    let (_tree, binding) = bind(DOC);
    let widget: Widget = binding.root().unwrap();
    let err = widget.0.cast::<Label>().unwrap_err();
    assert!(matches!(err, tagbind::Error::TypeMismatch { .. }));
    let again: Widget = widget.0.cast().unwrap();
    assert_eq!(again, widget);
}

#[test]
fn test_missing_root() {
    let tree = Arc::new(MemoryTree::new("empty"));
    let binding = BindingEngine::new().bind(tree);
    let err = binding.root::<Widget>().unwrap_err();
    assert_eq!(err.code(), "MISSING_ROOT");
}
