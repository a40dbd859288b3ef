use std::sync::Arc;

use crate::{ConvertContext, Converter, Error, Result, Value, View, ViewInterface};

/// Converter for values naming another view of the same document.
///
/// Reading resolves the text against the name attribute of tags bound to the
/// target interface; writing renders the target's name.
pub struct ReferenceConverter {
    interface: Arc<ViewInterface>,
}

impl ReferenceConverter {
    pub fn new(interface: Arc<ViewInterface>) -> Self {
        Self { interface }
    }

    pub fn interface(&self) -> &Arc<ViewInterface> {
        &self.interface
    }
}

impl Converter for ReferenceConverter {
    fn from_text(&self, text: &str, cx: &ConvertContext<'_>) -> Result<Option<Value>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        Ok(cx
            .resolve_named(&self.interface, text)?
            .map(|view| Arc::new(view) as Value))
    }

    fn to_text(&self, value: &Value, cx: &ConvertContext<'_>) -> Result<Option<String>> {
        match value.downcast_ref::<View>() {
            Some(view) => cx.view_name(view),
            None => Err(Error::TypeMismatch {
                expected: self.interface.name().to_owned(),
                found: "a non-view value".to_owned(),
            }),
        }
    }

    fn target(&self) -> &str {
        self.interface.name()
    }
}
