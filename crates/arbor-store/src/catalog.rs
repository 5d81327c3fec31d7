//! The catalog document: function records living outside the branch tree.

use crate::persist::{DocumentFile, StoreError};
use crate::xml;

/// How a function is invoked: endpoint url, method, request content type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallDef {
    pub url: Option<String>,
    pub method: Option<String>,
    pub content_type: Option<String>,
}

/// One callable capability. Metadata only — no executable code lives here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionDef {
    pub id: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub descr: Option<String>,
    /// Comma-joined tag set, kept sorted and de-duplicated.
    pub tags: Option<String>,
    pub call: Option<CallDef>,
}

/// A queryable function property.
///
/// `CallPath` strips the query string from the call url at the first `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncProp {
    Id,
    Name,
    Title,
    Description,
    CallPath,
    Method,
    ContentType,
}

impl FuncProp {
    pub const ALL: [FuncProp; 7] = [
        FuncProp::Id,
        FuncProp::Name,
        FuncProp::Title,
        FuncProp::Description,
        FuncProp::CallPath,
        FuncProp::Method,
        FuncProp::ContentType,
    ];

    /// Parse the external property name; `None` for anything unknown.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(FuncProp::Id),
            "name" => Some(FuncProp::Name),
            "title" => Some(FuncProp::Title),
            "description" => Some(FuncProp::Description),
            "callpath" => Some(FuncProp::CallPath),
            "method" => Some(FuncProp::Method),
            "contenttype" => Some(FuncProp::ContentType),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FuncProp::Id => "id",
            FuncProp::Name => "name",
            FuncProp::Title => "title",
            FuncProp::Description => "description",
            FuncProp::CallPath => "callpath",
            FuncProp::Method => "method",
            FuncProp::ContentType => "contenttype",
        }
    }

    /// Extract this property's value from a function record; `None` when the
    /// record does not carry it.
    pub fn extract(&self, f: &FunctionDef) -> Option<String> {
        match self {
            FuncProp::Id => Some(f.id.clone()),
            FuncProp::Name => f.name.clone(),
            FuncProp::Title => f.title.clone(),
            FuncProp::Description => f.descr.clone(),
            FuncProp::CallPath => f
                .call
                .as_ref()
                .and_then(|c| c.url.as_ref())
                .map(|u| u.split('?').next().unwrap_or("").to_string()),
            FuncProp::Method => f.call.as_ref().and_then(|c| c.method.clone()),
            FuncProp::ContentType => f.call.as_ref().and_then(|c| c.content_type.clone()),
        }
    }
}

/// The catalog document, preserving record order. Replacing a definition by
/// id keeps its slot so the document shape stays reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDocument {
    pub functions: Vec<FunctionDef>,
}

impl CatalogDocument {
    pub fn function(&self, id: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn function_mut(&mut self, id: &str) -> Option<&mut FunctionDef> {
        self.functions.iter_mut().find(|f| f.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.id == id)
    }

    /// All catalogued function ids, in record order.
    pub fn ids(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.id.clone()).collect()
    }

    pub fn load(file: &DocumentFile) -> Result<Self, StoreError> {
        let text = file.load_text()?;
        let doc = xml::parse_catalog(&text)?;
        tracing::info!(path = %file.path().display(), functions = doc.functions.len(), "catalog document loaded");
        Ok(doc)
    }

    pub fn save(&self, file: &DocumentFile) -> Result<(), StoreError> {
        let text = xml::write_catalog(self)?;
        file.save_text(&text)
    }
}
