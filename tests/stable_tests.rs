//! Tests for stable handles across document rebuilds

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tagbind::{
    BindingEngine, DocumentBinding, Error, MemoryTree, MethodDecl, PathStep, Revalidation,
    StableHandle, StablePath, StableState, TypedView, ValueType, View, ViewInterface,
};

#[derive(Clone, Debug, PartialEq)]
struct Module(View);

tagbind::typed_view!(
    Module,
    ViewInterface::builder("Module")
        .tag("module")
        .method(MethodDecl::getter("getName", ValueType::text()))
        .method(MethodDecl::getter("getModules", ValueType::views::<Module>()))
        .method(MethodDecl::getter("getDescription", ValueType::view::<Text>()))
        .build()
);

#[derive(Clone, Debug, PartialEq)]
struct Text(View);

tagbind::typed_view!(
    Text,
    ViewInterface::builder("Text")
        .method(MethodDecl::getter("getValue", ValueType::text()))
        .build()
);

const DOC: &str = r#"<module name="root"><module name="a"/><module name="b"><description>b!</description></module></module>"#;

fn bind() -> (Arc<MemoryTree>, Arc<DocumentBinding>) {
    let tree = Arc::new(MemoryTree::parse("m.xml", DOC).unwrap());
    let binding = BindingEngine::new().bind(tree.clone());
    (tree, binding)
}

fn second_module(binding: &Arc<DocumentBinding>) -> Module {
    let root: Module = binding.root().unwrap();
    root.0.children::<Module>("getModules").unwrap().remove(1)
}

#[test]
fn test_continuity_across_rebuild() {
    let (tree, binding) = bind();
    let b = second_module(&binding);
    let stable = binding.stable(&b).unwrap();
    assert_eq!(stable.state(), StableState::Valid);

    tree.reparse(DOC).unwrap();
    assert_eq!(stable.state(), StableState::Stale);

    let current = stable.get_current().unwrap();
    assert_ne!(current, b);
    assert_eq!(current, second_module(&binding));
    assert_eq!(current.0.get::<String>("getName").unwrap().as_deref(), Some("b"));
    assert_eq!(stable.state(), StableState::Valid);
}

#[test]
fn test_fixed_child_path_survives_rebuild() {
    let (tree, binding) = bind();
    let description: Text = second_module(&binding).0.child("getDescription").unwrap();
    let stable = binding.stable(&description).unwrap();

    tree.reparse(DOC).unwrap();
    let current = stable.get_current().unwrap();
    assert_eq!(current.0.get::<String>("getValue").unwrap().as_deref(), Some("b!"));
}

#[test]
fn test_path_shape() {
    let (_tree, binding) = bind();
    let b = second_module(&binding);
    let path = StablePath::of(b.as_view()).unwrap();
    let steps: Vec<_> = path.segments().iter().map(|s| s.step.clone()).collect();
    assert_eq!(
        steps,
        [
            PathStep::Root { name: "module".to_owned() },
            PathStep::Element { name: "module".to_owned(), position: 1 },
        ]
    );
    assert_eq!(path.segments()[1].interface.as_ref().unwrap().name(), "Module");
}

#[test]
fn test_detached_handle_fails_loudly() {
    let (tree, binding) = bind();
    let b = second_module(&binding);
    let stable = binding.stable(&b).unwrap();

    tree.reparse(r#"<module name="root"><module name="a"/></module>"#)
        .unwrap();
    assert!(!stable.is_valid());
    assert_eq!(stable.state(), StableState::Detached);
    let err = stable.get_current().unwrap_err();
    assert!(matches!(err, Error::CalledOnInvalidStableHandle { .. }));
    assert!(err.is_programming_error());
    assert_eq!(stable.last_known_good(), Some(b.0.clone()));
}

#[test]
fn test_detached_handle_recovers_later() {
    let (tree, binding) = bind();
    let b = second_module(&binding);
    let stable = binding.stable(&b).unwrap();

    tree.reparse(r#"<module name="root"/>"#).unwrap();
    assert!(!stable.is_valid());
    tree.reparse(DOC).unwrap();
    assert!(stable.is_valid());
    assert_eq!(stable.state(), StableState::Valid);
}

#[test]
fn test_detachment_equality() {
    let (tree, binding) = bind();
    let b = second_module(&binding);
    let first = binding.stable(&b).unwrap();
    let second = binding.stable(&second_module(&binding)).unwrap();
    let other = binding.stable(&binding.root::<Module>().unwrap()).unwrap();

    tree.reparse(r#"<other/>"#).unwrap();
    assert!(!first.is_valid());
    assert!(!second.is_valid());
    assert_eq!(first, second);
    assert_ne!(first, other);
}

#[test]
fn test_equal_handles_hash_alike() {
    use std::hash::{BuildHasher, RandomState};

    let (_tree, binding) = bind();
    let first = binding.stable(&second_module(&binding)).unwrap();
    let second = binding.stable(&second_module(&binding)).unwrap();
    let state = RandomState::new();
    assert_eq!(first, second);
    assert_eq!(state.hash_one(&first), state.hash_one(&second));
}

#[test]
fn test_disposed_tree_detaches_permanently() {
    let (tree, binding) = bind();
    let stable = binding.stable(&second_module(&binding)).unwrap();
    tree.dispose();
    assert!(!stable.is_valid());
    assert!(!stable.revalidate());
    assert_eq!(stable.state(), StableState::Detached);
    assert!(matches!(
        stable.view(),
        Err(Error::CalledOnInvalidStableHandle { .. })
    ));
}

#[test]
fn test_invalidate_forces_revalidation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_tree, binding) = bind();
    let b = second_module(&binding);
    let target = b.0.clone();
    let counter = calls.clone();
    let stable: StableHandle<Module> = binding.stable_with(Some(b.0.clone()), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Revalidation::Found(target.clone())
    });

    stable.get_current().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    stable.invalidate();
    assert_eq!(stable.state(), StableState::Stale);
    assert_eq!(stable.get_current().unwrap(), b);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(stable.revalidate());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_missing_is_retried_but_gone_is_final() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_tree, binding) = bind();
    let counter = calls.clone();
    let missing: StableHandle<View> = binding.stable_with(None, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Revalidation::Missing
    });
    assert!(!missing.is_valid());
    assert!(!missing.is_valid());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let gone: StableHandle<View> = binding.stable_with(None, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Revalidation::Gone
    });
    assert!(!gone.is_valid());
    assert!(!gone.is_valid());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
