//! Compiled HTML templates.
//!
//! A template is literal text with function markers spliced in:
//!
//! ```text
//! <p>Request number <!--hst req_number -->.</p>
//! ```
//!
//! Compiling splits the source into [`Segment`]s. Text segments borrow the
//! caller's source, so the source must outlive the template. Function
//! segments refer to an entry of the engine's function table; a name that was
//! never registered gets an unbound entry and renders as a placeholder.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::server::Server;

/// Opening of a function marker. The marker runs up to the next `>`.
pub const MARKER: &str = "<!--hst ";

pub const MAX_NAME_LEN: usize = 255;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// A template function. It writes its output through the engine's body writers.
pub type Callback = Rc<dyn Fn(&mut Server) -> Result<()>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template function '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("empty template function name at byte {offset}")]
    EmptyName { offset: usize },
    #[error("template function name at byte {offset} is longer than 255 bytes")]
    NameTooLong { offset: usize },
    #[error("template marker at byte {offset} is not terminated")]
    Unterminated { offset: usize },
    #[error("template was compiled by another server")]
    ForeignTemplate,
}

pub enum TemplateFunction {
    Bound { name: String, callback: Callback },
    /// Referenced by a template but never registered.
    Unbound { name: String },
}

impl TemplateFunction {
    pub fn name(&self) -> &str {
        match self {
            TemplateFunction::Bound { name, .. } | TemplateFunction::Unbound { name } => name,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, TemplateFunction::Bound { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'s> {
    Text(&'s str),
    Function(FunctionId),
}

#[derive(Debug, Clone)]
pub struct Template<'s> {
    table: u64,
    segments: Vec<Segment<'s>>,
}

impl<'s> Template<'s> {
    pub fn segments(&self) -> &[Segment<'s>] {
        &self.segments
    }

    pub(crate) fn table(&self) -> u64 {
        self.table
    }
}

/// Template functions in registration order, deduplicated by name.
pub(crate) struct FunctionTable {
    id: u64,
    functions: Vec<TemplateFunction>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            functions: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get(&self, id: FunctionId) -> Option<&TemplateFunction> {
        self.functions.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name() == name)
            .map(FunctionId)
    }

    /// Binds `callback` to `name`. Binding a forward reference is fine;
    /// replacing an existing callback is not.
    pub fn register(&mut self, name: &str, callback: Callback) -> Result<FunctionId, TemplateError> {
        let Some(id) = self.find(name) else {
            self.functions.push(TemplateFunction::Bound {
                name: name.to_owned(),
                callback,
            });
            return Ok(FunctionId(self.functions.len() - 1));
        };

        let entry = &mut self.functions[id.0];
        if entry.is_bound() {
            return Err(TemplateError::AlreadyRegistered(name.to_owned()));
        }
        *entry = TemplateFunction::Bound {
            name: name.to_owned(),
            callback,
        };
        Ok(id)
    }

    /// Looks `name` up, adding an unbound entry if it is unknown.
    fn reference(&mut self, name: &str) -> FunctionId {
        self.find(name).unwrap_or_else(|| {
            self.functions.push(TemplateFunction::Unbound {
                name: name.to_owned(),
            });
            FunctionId(self.functions.len() - 1)
        })
    }

    pub fn compile<'s>(&mut self, source: &'s str) -> Result<Template<'s>, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find(MARKER) {
            if start > 0 {
                segments.push(Segment::Text(&rest[..start]));
            }

            let after = &rest[start + MARKER.len()..];
            let name_start = after.len() - after.trim_start_matches(' ').len();
            let tail = &after[name_start..];
            let name_len = tail.find([' ', '-', '>']).unwrap_or(tail.len());
            let name = &tail[..name_len];

            if name.is_empty() {
                return Err(TemplateError::EmptyName { offset: offset + start });
            }
            if name.len() > MAX_NAME_LEN {
                return Err(TemplateError::NameTooLong { offset: offset + start });
            }
            let close = tail[name_len..]
                .find('>')
                .ok_or(TemplateError::Unterminated { offset: offset + start })?;

            segments.push(Segment::Function(self.reference(name)));

            let consumed = start + MARKER.len() + name_start + name_len + close + 1;
            rest = &rest[consumed..];
            offset += consumed;
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest));
        }

        Ok(Template {
            table: self.id,
            segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Rc::new(|_: &mut Server| -> Result<()> { Ok(()) })
    }

    #[test]
    fn test_compile_splits_text_and_markers() {
        let mut table = FunctionTable::new();
        let template = table.compile("a<!--hst f -->b").unwrap();

        let f = table.find("f").unwrap();
        assert_eq!(
            template.segments(),
            &[Segment::Text("a"), Segment::Function(f), Segment::Text("b")]
        );
        assert!(!table.get(f).unwrap().is_bound());
    }

    #[test]
    fn test_compile_without_markers_is_one_segment() {
        let mut table = FunctionTable::new();
        let template = table.compile("<p>plain</p>").unwrap();
        assert_eq!(template.segments(), &[Segment::Text("<p>plain</p>")]);

        let empty = table.compile("").unwrap();
        assert!(empty.segments().is_empty());
    }

    #[test]
    fn test_adjacent_markers_share_entries() {
        let mut table = FunctionTable::new();
        let template = table
            .compile("<!--hst  a --><!--hst b--><!--hst a -->")
            .unwrap();

        let a = table.find("a").unwrap();
        let b = table.find("b").unwrap();
        assert_eq!(
            template.segments(),
            &[Segment::Function(a), Segment::Function(b), Segment::Function(a)]
        );
    }

    #[test]
    fn test_compile_rejects_bad_markers() {
        let mut table = FunctionTable::new();

        assert_eq!(
            table.compile("x<!--hst -->").unwrap_err(),
            TemplateError::EmptyName { offset: 1 }
        );
        assert_eq!(
            table.compile("<!--hst open").unwrap_err(),
            TemplateError::Unterminated { offset: 0 }
        );

        let long = format!("<!--hst {} -->", "n".repeat(MAX_NAME_LEN + 1));
        assert_eq!(
            table.compile(&long).unwrap_err(),
            TemplateError::NameTooLong { offset: 0 }
        );
    }

    #[test]
    fn test_register_binds_forward_reference() {
        let mut table = FunctionTable::new();
        table.compile("<!--hst later -->").unwrap();
        let id = table.find("later").unwrap();

        assert_eq!(table.register("later", noop()).unwrap(), id);
        assert!(table.get(id).unwrap().is_bound());
    }

    #[test]
    fn test_register_twice_fails() {
        let mut table = FunctionTable::new();
        table.register("f", noop()).unwrap();

        assert_eq!(
            table.register("f", noop()).unwrap_err(),
            TemplateError::AlreadyRegistered("f".into())
        );
    }

    #[test]
    fn test_tables_have_distinct_ids() {
        let mut first = FunctionTable::new();
        let second = FunctionTable::new();

        assert_ne!(first.id(), second.id());
        assert_eq!(first.compile("x").unwrap().table(), first.id());
    }
}
