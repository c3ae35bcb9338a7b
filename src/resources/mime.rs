//! Image format detection from signature bytes.

/// A detected image format: file extension (with leading dot) and MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFormat {
    pub extension: &'static str,
    pub mime_type: &'static str,
}

pub const PNG: ImageFormat = ImageFormat {
    extension: ".png",
    mime_type: "image/png",
};
pub const JPEG: ImageFormat = ImageFormat {
    extension: ".jpg",
    mime_type: "image/jpeg",
};
pub const GIF: ImageFormat = ImageFormat {
    extension: ".gif",
    mime_type: "image/gif",
};
pub const BMP: ImageFormat = ImageFormat {
    extension: ".bmp",
    mime_type: "image/bmp",
};
pub const WEBP: ImageFormat = ImageFormat {
    extension: ".webp",
    mime_type: "image/webp",
};
pub const KTX: ImageFormat = ImageFormat {
    extension: ".ktx",
    mime_type: "image/ktx",
};
/// Crunch has no registered MIME type; `image/crn` is assigned by hand.
pub const CRN: ImageFormat = ImageFormat {
    extension: ".crn",
    mime_type: "image/crn",
};

/// Detect the format of an encoded image from its leading bytes.
pub fn sniff_image(source: &[u8]) -> Option<ImageFormat> {
    if source.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(PNG)
    } else if source.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(JPEG)
    } else if source.starts_with(b"GIF8") {
        Some(GIF)
    } else if source.starts_with(b"RIFF") && source.get(8..12) == Some(b"WEBP".as_slice()) {
        Some(WEBP)
    } else if source.starts_with(&[0xAB, 0x4B, 0x54, 0x58]) {
        Some(KTX)
    } else if source.starts_with(&[0x48, 0x78]) {
        Some(CRN)
    } else if source.starts_with(b"BM") {
        Some(BMP)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_signatures() {
        assert_eq!(
            sniff_image(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(PNG)
        );
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(JPEG));
        assert_eq!(sniff_image(b"GIF89a"), Some(GIF));
        assert_eq!(sniff_image(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some(WEBP));
        assert_eq!(sniff_image(&[0xAB, 0x4B, 0x54, 0x58, 0x20]), Some(KTX));
        assert_eq!(sniff_image(&[0x48, 0x78, 0x00]), Some(CRN));
        assert_eq!(sniff_image(b"BM\x00\x00"), Some(BMP));
        assert_eq!(sniff_image(b"plain text"), None);
        assert_eq!(sniff_image(&[]), None);
    }
}
