//! Tests for the in-memory reference tree

use std::{sync::Arc, thread};

use tagbind::{MemoryTree, MutationScope, Stamp, TreeError, TreeNode, TreeProvider, exclusive};

#[test]
fn test_parse_and_navigate() {
    let tree = MemoryTree::parse(
        "deps.xml",
        r#"<deps><dep id="a">1</dep><other/><dep id="b">2</dep></deps>"#,
    )
    .unwrap();
    let root = tree.root().unwrap();
    assert_eq!(tree.tag_name(root).as_deref(), Some("deps"));
    assert_eq!(tree.children(root).len(), 3);
    let deps = tree.children_by_name(root, "dep");
    assert_eq!(deps.len(), 2);
    assert_eq!(tree.attribute(deps[1], "id").as_deref(), Some("b"));
    assert_eq!(tree.text(deps[0]).as_deref(), Some("1"));
    assert_eq!(tree.parent(deps[0]), Some(root));
    assert_eq!(tree.parent(root), None);
    assert_eq!(tree.document_name(), "deps.xml");
}

#[test]
fn test_raw_text_and_exists() {
    let tree = MemoryTree::parse("t", r#"<a k="v">text</a>"#).unwrap();
    let root = tree.root().unwrap();
    let attribute = TreeNode::Attribute {
        owner: root,
        name: "k".to_owned(),
    };
    let missing = TreeNode::Attribute {
        owner: root,
        name: "nope".to_owned(),
    };
    assert_eq!(tree.raw_text(&TreeNode::Tag(root)).as_deref(), Some("text"));
    assert_eq!(tree.raw_text(&attribute).as_deref(), Some("v"));
    assert!(tree.exists(&attribute));
    assert!(!tree.exists(&missing));
}

#[test]
fn test_mutation_requires_exclusive_scope() {
    let tree = MemoryTree::parse("t", "<a/>").unwrap();
    let root = tree.root().unwrap();
    assert_eq!(
        tree.set_attribute(root, "x", Some("1")),
        Err(TreeError::NotExclusive)
    );
    assert_eq!(tree.create_child(root, "b"), Err(TreeError::NotExclusive));
    tree.write(|| tree.set_attribute(root, "x", Some("1"))).unwrap();
    assert_eq!(tree.attribute(root, "x").as_deref(), Some("1"));
}

#[test]
fn test_every_mutation_bumps_the_stamp() {
    let tree = MemoryTree::parse("t", "<a/>").unwrap();
    let root = tree.root().unwrap();
    let mut last = tree.modification_stamp();
    let mut check = |tree: &MemoryTree| {
        let now = tree.modification_stamp();
        assert!(now > last);
        last = now;
    };
    tree.write(|| tree.set_text(root, Some("x"))).unwrap();
    check(&tree);
    let child = tree.write(|| tree.create_child(root, "b")).unwrap();
    check(&tree);
    tree.write(|| tree.remove(child)).unwrap();
    check(&tree);
    tree.reparse("<a/>").unwrap();
    check(&tree);
    assert!(tree.modification_stamp() > Stamp(0));
}

#[test]
fn test_to_xml_escapes() {
    let tree = MemoryTree::new("t");
    let root = tree.write(|| tree.create_root("a")).unwrap();
    tree.write(|| {
        tree.set_attribute(root, "q", Some("\"<&>\"")).unwrap();
        tree.set_text(root, Some("1 < 2")).unwrap();
    });
    let xml = tree.to_xml();
    assert_eq!(xml, r#"<a q="&quot;&lt;&amp;&gt;&quot;">1 &lt; 2</a>"#);
    let again = MemoryTree::parse("t", &xml).unwrap();
    let root = again.root().unwrap();
    assert_eq!(again.attribute(root, "q").as_deref(), Some("\"<&>\""));
    assert_eq!(again.text(root).as_deref(), Some("1 < 2"));
}

#[test]
fn test_parse_errors() {
    assert!(matches!(
        MemoryTree::parse("t", "<a><b></a>"),
        Err(TreeError::Parse(_))
    ));
    let tree = MemoryTree::parse("t", "<a/>").unwrap();
    assert!(matches!(tree.reparse("<a><b/>"), Err(TreeError::Parse(_))));
    assert_eq!(tree.epoch(), 0);
}

#[test]
fn test_dispose() {
    let tree = MemoryTree::parse("t", "<a/>").unwrap();
    let root = tree.root().unwrap();
    tree.dispose();
    assert!(tree.is_disposed());
    assert!(!tree.is_valid(root));
    assert_eq!(tree.root(), None);
    assert_eq!(tree.reparse("<a/>"), Err(TreeError::Disposed("t".to_owned())));
}

#[test]
fn test_exclusive_blocks_other_threads() {
    let tree = Arc::new(MemoryTree::parse("t", "<a/>").unwrap());
    let root = tree.root().unwrap();
    let value = exclusive(tree.as_ref(), || {
        let other = tree.clone();
        let handle = thread::spawn(move || {
            assert!(!other.is_exclusive());
            other.write(|| other.set_text(root, Some("other"))).unwrap();
        });
        tree.set_text(root, Some("mine")).unwrap();
        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(tree.text(root).as_deref(), Some("mine"));
        handle
    });
    value.join().unwrap();
    assert_eq!(tree.text(root).as_deref(), Some("other"));
}

struct SkippingScope;

impl MutationScope for SkippingScope {
    fn run_exclusive(&self, _action: &mut dyn FnMut()) {}

    fn is_exclusive(&self) -> bool {
        false
    }
}

#[test]
#[should_panic(expected = "returned without running the action")]
fn test_exclusive_panics_when_scope_skips_action() {
    exclusive(&SkippingScope, || 1);
}
