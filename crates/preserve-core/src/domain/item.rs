//! Preservable items and the dataset that owns them.
//!
//! Items are shared between the dataset and the tasks that preserve them
//! (`Arc`). Only two things change during a run: the manifest identifier of a
//! form (set once) and the preserved flag. Both live behind a small mutex so a
//! task can update them atomically.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::ids::{Cpid, ItemId, SubjectKey};
use super::record::RepInfoLabel;

/// A descriptive key/value pair filled in on a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub display_name: String,
    pub value: String,
}

impl FormField {
    pub fn new(display_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            value: value.into(),
        }
    }
}

/// Where the content of a form lives.
#[derive(Clone, PartialEq, Eq)]
pub enum ContentHolder {
    /// Nothing attached yet.
    Empty,

    /// Bytes to upload.
    Embedded {
        bytes: Vec<u8>,
        file_name: String,
        mime_type: String,
    },

    /// Pre-existing resource; nothing is uploaded.
    Reference { uri: String },
}

impl ContentHolder {
    pub fn embedded(
        bytes: impl Into<Vec<u8>>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self::Embedded {
            bytes: bytes.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn reference(uri: impl Into<String>) -> Self {
        Self::Reference { uri: uri.into() }
    }

    /// Is there actual content or a reference to preserve?
    pub fn is_ready(&self) -> bool {
        match self {
            ContentHolder::Empty => false,
            ContentHolder::Embedded { bytes, .. } => !bytes.is_empty(),
            ContentHolder::Reference { uri } => !uri.trim().is_empty(),
        }
    }
}

// bytes は長くなりがちなのでサイズだけ出す
impl fmt::Debug for ContentHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentHolder::Empty => f.write_str("Empty"),
            ContentHolder::Embedded {
                bytes,
                file_name,
                mime_type,
            } => f
                .debug_struct("Embedded")
                .field("len", &bytes.len())
                .field("file_name", file_name)
                .field("mime_type", mime_type)
                .finish(),
            ContentHolder::Reference { uri } => {
                f.debug_struct("Reference").field("uri", uri).finish()
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FormState {
    manifest_cpid: Option<Cpid>,
    preserved: bool,
}

/// A manifest-bearing form item.
#[derive(Debug)]
pub struct FormItem {
    item_id: ItemId,
    name: String,
    item_file_name: Option<String>,
    content: ContentHolder,
    fields: Vec<FormField>,
    categories: Vec<String>,
    ril_cpid: Cpid,
    state: Mutex<FormState>,
}

impl FormItem {
    pub fn new(name: impl Into<String>, ril_cpid: Cpid, content: ContentHolder) -> Self {
        Self {
            item_id: ItemId::from_ulid(Ulid::new()),
            name: name.into(),
            item_file_name: None,
            content,
            fields: Vec::new(),
            categories: Vec::new(),
            ril_cpid,
            state: Mutex::new(FormState::default()),
        }
    }

    pub fn with_item_file_name(mut self, item_file_name: impl Into<String>) -> Self {
        self.item_file_name = Some(item_file_name.into());
        self
    }

    pub fn with_field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Form that already carries an identifier from a previous attempt.
    pub fn with_manifest_cpid(self, cpid: Cpid) -> Self {
        self.state.lock().manifest_cpid = Some(cpid);
        self
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn item_file_name(&self) -> Option<&str> {
        self.item_file_name.as_deref()
    }

    pub fn content(&self) -> &ContentHolder {
        &self.content
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn ril_cpid(&self) -> &Cpid {
        &self.ril_cpid
    }

    pub fn manifest_cpid(&self) -> Option<Cpid> {
        self.state.lock().manifest_cpid.clone()
    }

    pub fn is_preserved(&self) -> bool {
        self.state.lock().preserved
    }

    /// Record a successful store.
    ///
    /// The identifier is only taken when the form has none yet; an existing
    /// one is never overwritten.
    pub fn record_preserved(&self, stored_cpid: &Cpid) {
        let mut state = self.state.lock();
        if state.manifest_cpid.is_none() {
            state.manifest_cpid = Some(stored_cpid.clone());
        }
        state.preserved = true;
    }
}

#[derive(Debug, Clone, Default)]
struct LabelState {
    version: Option<u32>,
    preserved: bool,
}

/// A descriptive label (representation information) attached to a dataset.
#[derive(Debug)]
pub struct DatasetLabel {
    cpid: Cpid,
    name: String,
    description: Option<String>,
    state: Mutex<LabelState>,
}

impl DatasetLabel {
    pub fn new(cpid: Cpid, name: impl Into<String>) -> Self {
        Self {
            cpid,
            name: name.into(),
            description: None,
            state: Mutex::new(LabelState::default()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn cpid(&self) -> &Cpid {
        &self.cpid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<u32> {
        self.state.lock().version
    }

    pub fn is_preserved(&self) -> bool {
        self.state.lock().preserved
    }

    /// Registry-side representation of the label as it is now.
    pub fn to_rep_info_label(&self) -> RepInfoLabel {
        RepInfoLabel {
            cpid: self.cpid.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version(),
        }
    }

    /// Copy forward the confirmed version and mark preserved.
    pub fn record_preserved(&self, version: Option<u32>) {
        let mut state = self.state.lock();
        state.version = version;
        state.preserved = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreservableKind {
    Manifest,
    Label,
}

/// Identity of a preservable item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PreservableKey {
    Form(ItemId),
    Label(Cpid),
}

/// Anything a preservation run can submit to a registry.
///
/// Equality and hashing go through [`PreservableKey`], never the contents.
#[derive(Debug, Clone)]
pub enum Preservable {
    Manifest(Arc<FormItem>),
    Label(Arc<DatasetLabel>),
}

impl Preservable {
    pub fn key(&self) -> PreservableKey {
        match self {
            Preservable::Manifest(form) => PreservableKey::Form(form.item_id()),
            Preservable::Label(label) => PreservableKey::Label(label.cpid().clone()),
        }
    }

    pub fn kind(&self) -> PreservableKind {
        match self {
            Preservable::Manifest(_) => PreservableKind::Manifest,
            Preservable::Label(_) => PreservableKind::Label,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Preservable::Manifest(form) => form.name(),
            Preservable::Label(label) => label.name(),
        }
    }

    /// The registry identifier currently known for this item, if any.
    pub fn identifier(&self) -> Option<Cpid> {
        match self {
            Preservable::Manifest(form) => form.manifest_cpid(),
            Preservable::Label(label) => Some(label.cpid().clone()),
        }
    }

    pub fn is_preserved(&self) -> bool {
        match self {
            Preservable::Manifest(form) => form.is_preserved(),
            Preservable::Label(label) => label.is_preserved(),
        }
    }
}

impl PartialEq for Preservable {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Preservable {}

impl Hash for Preservable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Preservable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preservable::Manifest(form) => write!(f, "form '{}'", form.name()),
            Preservable::Label(label) => write!(f, "label '{}'", label.cpid()),
        }
    }
}

/// The subject of a preservation job.
#[derive(Debug)]
pub struct Dataset {
    name: String,
    forms: Vec<Arc<FormItem>>,
    labels: Vec<Arc<DatasetLabel>>,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            forms: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn with_form(mut self, form: FormItem) -> Self {
        self.forms.push(Arc::new(form));
        self
    }

    pub fn with_label(mut self, label: DatasetLabel) -> Self {
        self.labels.push(Arc::new(label));
        self
    }

    pub fn subject_key(&self) -> SubjectKey {
        SubjectKey::new(self.name.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn forms(&self) -> &[Arc<FormItem>] {
        &self.forms
    }

    pub fn labels(&self) -> &[Arc<DatasetLabel>] {
        &self.labels
    }
}
