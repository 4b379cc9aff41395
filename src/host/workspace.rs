//! Documents the editor currently has open.

use rustc_hash::FxHashMap;

use super::PreviewCommand;
use crate::core::{Document, DocumentId};
use crate::panel::RevealOptions;

#[derive(Debug, Default)]
pub struct Workspace {
    documents: FxHashMap<DocumentId, Document>,
    active: Option<DocumentId>,
}

impl Workspace {
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.get(id)
    }

    /// Document with editor focus.
    pub fn active(&self) -> Option<&Document> {
        self.documents.get(self.active.as_ref()?)
    }

    /// Track `document` and give it focus.
    pub fn open(&mut self, document: Document) {
        self.active = Some(document.id.clone());
        self.documents.insert(document.id.clone(), document);
    }

    /// Replace the text of a tracked document; untracked ones are ignored.
    pub fn update(&mut self, document: Document) {
        if let Some(existing) = self.documents.get_mut(&document.id) {
            *existing = document;
        }
    }

    pub fn focus(&mut self, id: &DocumentId) {
        if self.documents.contains_key(id) {
            self.active = Some(id.clone());
        }
    }

    pub fn close(&mut self, id: &DocumentId) {
        self.documents.remove(id);
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
    }

    /// Work out the identity and seed for a preview command.
    ///
    /// With neither content nor document the active document is used. An
    /// explicit `uri` wins over the document's own identity. Content falls
    /// back to the document text, then to the tracked text; empty text
    /// counts as no content.
    pub fn resolve_preview(&self, command: PreviewCommand) -> (Option<DocumentId>, RevealOptions) {
        let PreviewCommand {
            mut document,
            uri,
            content,
            title,
            search,
            allow_multiple_panels,
            callback,
        } = command;

        let mut content = content.filter(|text| !text.is_empty());
        if content.is_none() && document.is_none() {
            document = self.active().cloned();
        }

        if content.is_none()
            && let Some(document) = &document
        {
            content = Some(document.text.clone())
                .filter(|text| !text.is_empty())
                .or_else(|| {
                    self.get(&document.id)
                        .map(|tracked| tracked.text.clone())
                        .filter(|text| !text.is_empty())
                });
        }

        let identity = uri.or_else(|| document.map(|document| document.id));
        let options = RevealOptions {
            content,
            title,
            search,
            allow_multiple_panels,
            callback,
        };
        (identity, options)
    }
}
