//! Input splitting: one OCR unit per page.
//!
//! PDFs are re-encoded into single-page documents so that each OCR call
//! carries only the page it transcribes. Images are passed through as a
//! single unit.

use std::sync::Arc;

use lopdf::Document;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SplitSettings;

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("unsupported file type: {mime}")]
    UnsupportedFileType { mime: String },
    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },
    #[error("document contains no pages")]
    EmptyDocument,
    #[error("failed to process pdf: {source}")]
    Pdf {
        #[source]
        source: lopdf::Error,
    },
}

/// MIME types accepted by the splitter and the OCR backend.
///
/// Any `image/*` type is passed through untouched; the backend decides
/// whether it can decode the subtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocMimeType {
    Pdf,
    Image(String),
}

impl DocMimeType {
    pub fn as_str(&self) -> &str {
        match self {
            DocMimeType::Pdf => "application/pdf",
            DocMimeType::Image(mime) => mime,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" => Some(DocMimeType::Pdf),
            // common misspelling of the registered image/jpeg
            "image/jpg" => Some(DocMimeType::Image("image/jpeg".to_string())),
            _ if mime.starts_with("image/") => Some(DocMimeType::Image(mime)),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let subtype = match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => return Some(DocMimeType::Pdf),
            "png" => "png",
            "jpg" | "jpeg" => "jpeg",
            "webp" => "webp",
            "gif" => "gif",
            _ => return None,
        };
        Some(DocMimeType::Image(format!("image/{subtype}")))
    }
}

/// A single page ready for one OCR call. `page_number` is 1-indexed and
/// dense across the parent document.
#[derive(Debug, Clone)]
pub struct PageUnit {
    pub page_number: u32,
    pub bytes: Arc<[u8]>,
    pub mime_type: DocMimeType,
}

/// Splits raw input into per-page OCR units.
///
/// Images become exactly one unit. PDFs yield one re-encoded single-page
/// PDF per source page. Oversized inputs are rejected before parsing;
/// unusually long documents only warn.
pub fn split_into_pages(
    bytes: &[u8],
    mime: &str,
    settings: &SplitSettings,
) -> Result<Vec<PageUnit>, SplitError> {
    let mime_type = DocMimeType::from_mime(mime).ok_or_else(|| SplitError::UnsupportedFileType {
        mime: mime.to_string(),
    })?;

    if bytes.len() > settings.max_file_bytes {
        return Err(SplitError::FileTooLarge {
            size: bytes.len(),
            limit: settings.max_file_bytes,
        });
    }

    match mime_type {
        DocMimeType::Pdf => split_pdf(bytes, settings),
        image => Ok(vec![PageUnit {
            page_number: 1,
            bytes: Arc::from(bytes),
            mime_type: image,
        }]),
    }
}

fn split_pdf(bytes: &[u8], settings: &SplitSettings) -> Result<Vec<PageUnit>, SplitError> {
    let document = Document::load_mem(bytes).map_err(|source| SplitError::Pdf { source })?;
    let total_pages = document.get_pages().len();
    if total_pages == 0 {
        return Err(SplitError::EmptyDocument);
    }
    if total_pages > settings.large_page_warning {
        warn!(
            total_pages,
            threshold = settings.large_page_warning,
            "document is unusually long; processing will be slow"
        );
    }
    debug!(total_pages, "splitting pdf into single-page documents");

    let mut units = Vec::with_capacity(total_pages);
    for page_number in 1..=total_pages as u32 {
        let mut single = document.clone();
        let others: Vec<u32> = (1..=total_pages as u32)
            .filter(|n| *n != page_number)
            .collect();
        if !others.is_empty() {
            single.delete_pages(&others);
        }
        single.prune_objects();
        single.renumber_objects();

        let mut encoded = Vec::new();
        single
            .save_to(&mut encoded)
            .map_err(|source| SplitError::Pdf {
                source: lopdf::Error::IO(source),
            })?;
        units.push(PageUnit {
            page_number,
            bytes: Arc::from(encoded),
            mime_type: DocMimeType::Pdf,
        });
    }

    debug_assert_eq!(units.len(), total_pages);
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SplitSettings {
        SplitSettings {
            max_file_bytes: 1024 * 1024,
            large_page_warning: 200,
        }
    }

    /// Minimal well-formed three-page PDF built with lopdf itself.
    fn three_page_pdf() -> Vec<u8> {
        use lopdf::dictionary;
        use lopdf::{Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for _ in 0..3 {
            let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let kids_len = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => kids_len,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("pdf serializes");
        bytes
    }

    #[test]
    fn pdf_splits_into_dense_one_indexed_pages() {
        let bytes = three_page_pdf();

        let units = split_into_pages(&bytes, "application/pdf", &settings()).expect("split ok");

        assert_eq!(units.len(), 3);
        let numbers: Vec<u32> = units.iter().map(|u| u.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        for unit in &units {
            assert_eq!(unit.mime_type, DocMimeType::Pdf);
            let single = Document::load_mem(&unit.bytes).expect("page parses");
            assert_eq!(single.get_pages().len(), 1);
        }
    }

    #[test]
    fn image_becomes_single_unit() {
        let bytes = vec![0u8; 64];

        let units = split_into_pages(&bytes, "image/png", &settings()).expect("split ok");

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].page_number, 1);
        assert_eq!(units[0].mime_type, DocMimeType::Image("image/png".to_string()));
        assert_eq!(units[0].bytes.as_ref(), bytes.as_slice());
    }

    #[test]
    fn any_image_subtype_becomes_single_unit() {
        let units = split_into_pages(&[0u8; 16], "image/webp", &settings()).expect("split ok");

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].mime_type.as_str(), "image/webp");
    }

    #[test]
    fn unsupported_mime_is_rejected() {
        let err = split_into_pages(&[0u8; 4], "text/plain", &settings()).unwrap_err();
        assert!(matches!(err, SplitError::UnsupportedFileType { .. }));
    }

    #[test]
    fn oversized_input_is_rejected_before_parsing() {
        let small = SplitSettings {
            max_file_bytes: 16,
            large_page_warning: 200,
        };
        let err = split_into_pages(&[0u8; 32], "application/pdf", &small).unwrap_err();
        assert!(matches!(err, SplitError::FileTooLarge { size: 32, limit: 16 }));
    }

    #[test]
    fn corrupt_pdf_surfaces_parse_error() {
        let err = split_into_pages(b"not a pdf", "application/pdf", &settings()).unwrap_err();
        assert!(matches!(err, SplitError::Pdf { .. }));
    }

    #[test]
    fn mime_type_round_trips() {
        assert_eq!(DocMimeType::from_mime("application/pdf"), Some(DocMimeType::Pdf));
        assert_eq!(
            DocMimeType::from_mime("IMAGE/JPEG").map(|m| m.as_str().to_string()),
            Some("image/jpeg".to_string())
        );
        // image/jpg is folded onto the registered subtype
        assert_eq!(
            DocMimeType::from_mime("image/jpg"),
            DocMimeType::from_mime("image/jpeg")
        );
        assert_eq!(
            DocMimeType::from_extension("PNG").map(|m| m.as_str().to_string()),
            Some("image/png".to_string())
        );
        assert_eq!(DocMimeType::from_extension("docx"), None);
        assert_eq!(DocMimeType::Pdf.as_str(), "application/pdf");
    }
}
