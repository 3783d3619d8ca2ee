//! Packaging of embedded form content before upload.
//!
//! A form with filled-in descriptive fields is uploaded as a zip holding the
//! primary file and a generated `<name>_meta.xml`. Without such fields the raw
//! bytes are uploaded as they are.

use std::io::{Cursor, Write};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::domain::{ContentHolder, Cpid, FormField, FormItem, StorageCause};

pub const ARCHIVE_SUFFIX: &str = "_pa-packaged.zip";
pub const METADATA_SUFFIX: &str = "_meta.xml";
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Appended to the form's label identifier when its content is archived.
pub const PACKAGED_LABEL_SUFFIX: &str = "-Z";

/// What actually goes to the registry's upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
    pub ril_cpid: Cpid,
}

impl PreparedUpload {
    pub fn is_packaged(&self) -> bool {
        self.content_type == ARCHIVE_CONTENT_TYPE && self.file_name.ends_with(ARCHIVE_SUFFIX)
    }
}

/// Build the upload for an embedded form.
///
/// # Errors
/// `StorageCause::NoContent` if the form has no embedded bytes, or a packaging
/// error if the archive cannot be written.
pub fn prepare_upload(form: &FormItem) -> Result<PreparedUpload, StorageCause> {
    let ContentHolder::Embedded {
        bytes,
        file_name,
        mime_type,
    } = form.content()
    else {
        return Err(StorageCause::NoContent);
    };

    match metadata_document(form.fields()) {
        Some(document) => {
            tracing::debug!(form = form.name(), "descriptive fields found, packaging archive");
            tracing::trace!(document = %document, "metadata document");
            let archive = package_archive(file_name, bytes, &document)?;
            Ok(PreparedUpload {
                bytes: archive,
                file_name: format!("{file_name}{ARCHIVE_SUFFIX}"),
                content_type: ARCHIVE_CONTENT_TYPE.to_string(),
                ril_cpid: form.ril_cpid().with_suffix(PACKAGED_LABEL_SUFFIX),
            })
        }
        None => Ok(PreparedUpload {
            bytes: bytes.clone(),
            file_name: file_name.clone(),
            content_type: mime_type.clone(),
            ril_cpid: form.ril_cpid().clone(),
        }),
    }
}

/// Metadata document for the fields that have a value, or `None` if none do.
pub fn metadata_document(fields: &[FormField]) -> Option<String> {
    let mut entries = String::new();
    let mut count = 0usize;
    for field in fields.iter().filter(|f| !f.value.is_empty()) {
        count += 1;
        entries.push_str("<metadataentry><entryname>");
        entries.push_str(&escape_xml(&field.display_name));
        entries.push_str("</entryname><entryvalue>");
        entries.push_str(&escape_xml(&field.value));
        entries.push_str("</entryvalue></metadataentry>");
    }
    if count == 0 {
        return None;
    }
    Some(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><metadata>{entries}</metadata>"
    ))
}

/// Zip holding `<main_name>` and `<main_name>_meta.xml`.
pub fn package_archive(
    main_name: &str,
    main_bytes: &[u8],
    metadata: &str,
) -> Result<Vec<u8>, StorageCause> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file(main_name, options)?;
    zip.write_all(main_bytes)?;

    zip.start_file(format!("{main_name}{METADATA_SUFFIX}"), options)?;
    zip.write_all(metadata.as_bytes())?;

    Ok(zip.finish()?.into_inner())
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn embedded_form() -> FormItem {
        FormItem::new(
            "scan",
            Cpid::new("ril-7"),
            ContentHolder::embedded(b"PNGDATA".to_vec(), "scan.png", "image/png"),
        )
    }

    fn read_entry(archive: &[u8], name: &str) -> Vec<u8> {
        let mut zip = ZipArchive::new(Cursor::new(archive)).unwrap();
        let mut entry = zip.by_name(name).unwrap();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn metadata_document_skips_empty_values() {
        let fields = vec![FormField::new("Title", ""), FormField::new("Creator", "")];
        assert_eq!(metadata_document(&fields), None);
        assert_eq!(metadata_document(&[]), None);
    }

    #[test]
    fn metadata_document_escapes_markup() {
        let fields = vec![
            FormField::new("Title", "Fish & <Chips>"),
            FormField::new("Empty", ""),
        ];
        let doc = metadata_document(&fields).unwrap();

        assert!(doc.starts_with("<?xml"));
        assert!(doc.contains(
            "<metadataentry><entryname>Title</entryname><entryvalue>Fish &amp; &lt;Chips&gt;</entryvalue></metadataentry>"
        ));
        assert!(!doc.contains("Empty"));
    }

    #[test]
    fn plain_upload_keeps_original_name_type_and_label() {
        let form = embedded_form();
        let upload = prepare_upload(&form).unwrap();

        assert_eq!(upload.bytes, b"PNGDATA");
        assert_eq!(upload.file_name, "scan.png");
        assert_eq!(upload.content_type, "image/png");
        assert_eq!(upload.ril_cpid, Cpid::new("ril-7"));
        assert!(!upload.is_packaged());
    }

    #[test]
    fn described_upload_is_packaged_as_zip() {
        let form = embedded_form().with_field(FormField::new("Creator", "Ada"));
        let upload = prepare_upload(&form).unwrap();

        assert_eq!(upload.file_name, "scan.png_pa-packaged.zip");
        assert_eq!(upload.content_type, "application/zip");
        assert_eq!(upload.ril_cpid, Cpid::new("ril-7-Z"));
        assert!(upload.is_packaged());

        assert_eq!(read_entry(&upload.bytes, "scan.png"), b"PNGDATA");
        let meta = String::from_utf8(read_entry(&upload.bytes, "scan.png_meta.xml")).unwrap();
        assert!(meta.contains("<entryvalue>Ada</entryvalue>"));
    }

    #[test]
    fn reference_form_cannot_be_uploaded() {
        let form = FormItem::new(
            "link",
            Cpid::new("ril-1"),
            ContentHolder::reference("https://example.org/x"),
        );
        assert!(matches!(prepare_upload(&form), Err(StorageCause::NoContent)));
    }
}
