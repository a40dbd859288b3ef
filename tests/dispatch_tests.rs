//! Tests for invocation selection and registration

use std::sync::Arc;

use tagbind::{
    Annotation, BindingEngine, DispatchTable, Error, Invocation, MemoryTree, MethodDecl,
    NameStrategy, TreeError, TreeNode, TreeProvider, ValueTarget, ValueType, ViewInterface,
};

fn engine() -> Arc<BindingEngine> {
    BindingEngine::new()
}

struct Opaque;

#[test]
fn test_default_rules() {
    let interface = ViewInterface::builder("Dependency")
        .method(MethodDecl::getter("getGroupId", ValueType::text()))
        .method(MethodDecl::getter("isOptional", ValueType::boolean()))
        .method(MethodDecl::setter("setGroupId", ValueType::text()))
        .method(MethodDecl::getter("getValue", ValueType::text()))
        .method(MethodDecl::getter("getExclusions", ValueType::views_named("Dependency")))
        .method(MethodDecl::getter("getParent", ValueType::view_named("Dependency")))
        .method(MethodDecl::adder("addExclusion", ValueType::view_named("Dependency")))
        .build();
    let engine = engine();
    engine.register_interface(&interface).unwrap();
    let table = engine.dispatch();

    let resolve = |method: &str| table.resolve("Dependency", method).unwrap();
    assert!(matches!(
        &*resolve("getGroupId"),
        Invocation::GetValue { target: ValueTarget::Attribute(name), .. } if name == "group-id"
    ));
    assert!(matches!(
        &*resolve("isOptional"),
        Invocation::GetValue { target: ValueTarget::Attribute(name), .. } if name == "optional"
    ));
    assert!(matches!(
        &*resolve("setGroupId"),
        Invocation::SetValue { target: ValueTarget::Attribute(name), .. } if name == "group-id"
    ));
    assert!(matches!(
        &*resolve("getValue"),
        Invocation::GetValue { target: ValueTarget::TagValue, .. }
    ));
    assert!(matches!(
        &*resolve("getExclusions"),
        Invocation::GetCollection { name, .. } if name == "exclusion"
    ));
    assert!(matches!(
        &*resolve("getParent"),
        Invocation::GetFixedChild { name, index: 0, .. } if name == "parent"
    ));
    assert!(matches!(
        &*resolve("addExclusion"),
        Invocation::AddCollectionChild { name, .. } if name == "exclusion"
    ));
}

#[test]
fn test_annotations_take_precedence() {
    let interface = ViewInterface::builder("Module")
        .method(MethodDecl::getter("getTitle", ValueType::text()).with(Annotation::sub_tag("title")))
        .method(MethodDecl::getter("getKind", ValueType::text()).with(Annotation::attribute("type")))
        .method(MethodDecl::getter("getBody", ValueType::text()).with(Annotation::TagValue))
        .method(
            MethodDecl::getter("getSecond", ValueType::view_named("Module"))
                .with(Annotation::sub_tag_at("module", 1)),
        )
        .method(
            MethodDecl::getter("getModules", ValueType::views_named("Module"))
                .with(Annotation::sub_tag_list("module")),
        )
        .method(
            MethodDecl::adder("newModule", ValueType::view_named("Module"))
                .with(Annotation::sub_tag_list("module")),
        )
        .build();
    let engine = engine();
    engine.register_interface(&interface).unwrap();
    let resolve = |method: &str| engine.dispatch().resolve("Module", method).unwrap();

    assert!(matches!(
        &*resolve("getTitle"),
        Invocation::GetValue { target: ValueTarget::SubTag { name, index: 0 }, .. } if name == "title"
    ));
    assert!(matches!(
        &*resolve("getKind"),
        Invocation::GetValue { target: ValueTarget::Attribute(name), .. } if name == "type"
    ));
    assert!(matches!(
        &*resolve("getBody"),
        Invocation::GetValue { target: ValueTarget::TagValue, .. }
    ));
    assert!(matches!(
        &*resolve("getSecond"),
        Invocation::GetFixedChild { name, index: 1, .. } if name == "module"
    ));
    assert!(matches!(&*resolve("getModules"), Invocation::GetCollection { .. }));
    assert!(matches!(&*resolve("newModule"), Invocation::AddCollectionChild { .. }));
}

#[test]
fn test_java_naming() {
    let interface = ViewInterface::builder("Build")
        .name_strategy(NameStrategy::Java)
        .method(MethodDecl::getter("getFinalName", ValueType::text()))
        .build();
    let engine = engine();
    engine.register_interface(&interface).unwrap();
    assert!(matches!(
        &*engine.dispatch().resolve("Build", "getFinalName").unwrap(),
        Invocation::GetValue { target: ValueTarget::Attribute(name), .. } if name == "finalName"
    ));
}

#[test]
fn test_unsupported_method_fails_before_tree_access() {
    let interface = ViewInterface::builder("Broken")
        .method(MethodDecl::getter("getName", ValueType::text()))
        .method(MethodDecl::getter("compute", ValueType::text()))
        .build();
    let tree = Arc::new(MemoryTree::parse("b.xml", "<broken/>").unwrap());
    let binding = engine().bind(tree.clone());
    let stamp = tree.modification_stamp();

    let err = binding.root_view(&interface).unwrap_err();
    match &err {
        Error::UnsupportedViewMethod { interface, method, .. } => {
            assert_eq!(interface, "Broken");
            assert_eq!(method, "compute");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.is_programming_error());
    assert_eq!(tree.modification_stamp(), stamp);
    assert!(!binding.engine().dispatch().is_registered("Broken"));
}

#[test]
fn test_shape_errors() {
    let cases = [
        MethodDecl::new("setName", vec![ValueType::text(), ValueType::text()], ValueType::Void),
        MethodDecl::new("getName", vec![ValueType::text()], ValueType::text()),
        MethodDecl::getter("getFlag", ValueType::text()).with(Annotation::Indicator),
        MethodDecl::getter("getItems", ValueType::text()).with(Annotation::sub_tag_list("item")),
        MethodDecl::getter("get", ValueType::text()),
    ];
    for method in cases {
        let name = method.name().to_owned();
        let interface = ViewInterface::builder("Shapes").method(method).build();
        let err = engine().register_interface(&interface).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_VIEW_METHOD", "{name}");
    }
}

#[test]
fn test_missing_converter_and_lenient_fallback() {
    let strict = ViewInterface::builder("Strict")
        .method(MethodDecl::getter("getBlob", ValueType::of::<Vec<Opaque>>()))
        .build();
    let err = engine().register_interface(&strict).unwrap_err();
    assert!(matches!(err, Error::ConverterNotFound { .. }));

    let lenient = ViewInterface::builder("Lenient")
        .method(MethodDecl::getter("getBlob", ValueType::of::<Vec<Opaque>>()).with(Annotation::Lenient))
        .build();
    let tree = Arc::new(MemoryTree::parse("l.xml", r#"<lenient blob="raw"/>"#).unwrap());
    let binding = engine().bind(tree);
    let root = binding.root_view(&lenient).unwrap();
    assert_eq!(root.get::<String>("getBlob").unwrap().as_deref(), Some("raw"));
}

#[test]
fn test_unknown_named_interface() {
    let interface = ViewInterface::builder("Orphan")
        .method(MethodDecl::getter("getChild", ValueType::view_named("Nowhere")))
        .build();
    let err = engine().register_interface(&interface).unwrap_err();
    assert!(matches!(err, Error::UnknownInterface(name) if name == "Nowhere"));
}

#[test]
fn test_duplicate_interface_name() {
    let first = ViewInterface::builder("Twin").build();
    let second = ViewInterface::builder("Twin").build();
    let engine = engine();
    engine.register_interface(&first).unwrap();
    engine.register_interface(&first).unwrap();
    let err = engine.register_interface(&second).unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_INTERFACE");
}

#[test]
fn test_named_references_across_interfaces() {
    let item = ViewInterface::builder("Item")
        .method(MethodDecl::getter("getName", ValueType::text()))
        .build();
    let list = ViewInterface::builder("List")
        .method(MethodDecl::getter("getItems", ValueType::views_named("Item")))
        .build();
    let table = DispatchTable::new();
    let registry = tagbind::ConverterRegistry::with_defaults();
    assert!(table.register(&list, &registry, NameStrategy::Hyphen).is_err());
    table.register(&item, &registry, NameStrategy::Hyphen).unwrap();
    table.register(&list, &registry, NameStrategy::Hyphen).unwrap();
    assert!(table.is_registered("List"));
    assert!(Arc::ptr_eq(&table.interface("Item").unwrap(), &item));
}

#[test]
fn test_unknown_method_and_arguments() {
    let interface = ViewInterface::builder("Simple")
        .method(MethodDecl::getter("getName", ValueType::text()))
        .build();
    let tree = Arc::new(MemoryTree::parse("s.xml", r#"<simple name="x"/>"#).unwrap());
    let binding = engine().bind(tree);
    let root = binding.root_view(&interface).unwrap();
    assert!(matches!(
        root.invoke("getMissing", &[]),
        Err(Error::UnknownMethod { .. })
    ));
    assert!(matches!(
        root.invoke("getName", &[Arc::new(1u8) as tagbind::Value]),
        Err(Error::InvalidArguments { expected: 0, found: 1, .. })
    ));
    let attribute = root.attribute("name").unwrap();
    assert!(matches!(
        attribute.invoke("getName", &[]),
        Err(Error::UnknownMethod { .. })
    ));
    assert_eq!(
        attribute.tree_node().unwrap(),
        Some(TreeNode::Attribute {
            owner: binding.tree().root().unwrap(),
            name: "name".to_owned(),
        })
    );
}

#[test]
fn test_disposed_tree() {
    let interface = ViewInterface::builder("Simple").build();
    let tree = Arc::new(MemoryTree::parse("s.xml", "<simple/>").unwrap());
    let binding = engine().bind(tree.clone());
    let root = binding.root_view(&interface).unwrap();
    tree.dispose();
    assert!(!root.is_valid());
    assert!(matches!(
        binding.root_view(&interface),
        Err(Error::Tree(TreeError::Disposed(name))) if name == "s.xml"
    ));
}
