//! Node Model
//!
//! Classifies a description of "what to render" into one of four kinds:
//! text/primitive, tag element, class component, or functional component.
//! Pure data, no behavior — the render driver uses the classification to
//! decide whether hooks apply at all (they are meaningless for tag and text
//! nodes).

use crate::error::RenderError;

/// The kind of a render node, as seen by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A text or primitive leaf.
    Text,

    /// A plain tag element (`div`, `span`, ...).
    Tag,

    /// A class-based component.
    ClassComponent,

    /// A functional component. Only these carry a hook store.
    FunctionalComponent,
}

/// A description of what to render, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSpec {
    /// A text leaf.
    Text(String),

    /// A tag element with its tag name.
    Tag { name: String },

    /// A component reference. `class_based` distinguishes class components
    /// from functional ones.
    Component { name: String, class_based: bool },
}

/// Classify a node description.
///
/// An empty tag name is the one malformed description this model can see;
/// everything else the type system already rules out.
pub fn classify(spec: &NodeSpec) -> Result<NodeKind, RenderError> {
    match spec {
        NodeSpec::Text(_) => Ok(NodeKind::Text),
        NodeSpec::Tag { name } if name.is_empty() => Err(RenderError::UnsupportedNode(
            "tag element with empty name".into(),
        )),
        NodeSpec::Tag { .. } => Ok(NodeKind::Tag),
        NodeSpec::Component { class_based, .. } => Ok(if *class_based {
            NodeKind::ClassComponent
        } else {
            NodeKind::FunctionalComponent
        }),
    }
}

/// Whether a node of this kind owns a hook store.
pub fn supports_hooks(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::FunctionalComponent)
}

/// Whether a node of this kind mounts a component instance at all.
pub fn is_component(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::ClassComponent | NodeKind::FunctionalComponent
    )
}
