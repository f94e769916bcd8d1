pub mod slug {
    /// Precomposed Vietnamese letters grouped by their unaccented base.
    const FOLDS: &[(&str, char)] = &[
        ("àáạảãâầấậẩẫăằắặẳẵ", 'a'),
        ("èéẹẻẽêềếệểễ", 'e'),
        ("ìíịỉĩ", 'i'),
        ("òóọỏõôồốộổỗơờớợởỡ", 'o'),
        ("ùúụủũưừứựửữ", 'u'),
        ("ỳýỵỷỹ", 'y'),
        ("đ", 'd'),
    ];

    fn fold(c: char) -> char {
        FOLDS
            .iter()
            .find(|(accented, _)| accented.contains(c))
            .map_or(c, |&(_, base)| base)
    }

    /// Converts a Vietnamese title into a URL-safe identifier.
    ///
    /// "Thám Tử Conan" becomes "tham-tu-conan". The result only contains
    /// `[a-z0-9-]`, never starts or ends with a hyphen and never contains two
    /// hyphens in a row. Uniqueness is the caller's concern.
    pub fn to_slug(title: &str) -> String {
        let lowered = title.trim().to_lowercase();

        let mut slug = String::with_capacity(lowered.len());
        let mut in_whitespace = false;
        for c in lowered.chars().map(fold) {
            if c.is_whitespace() {
                if !in_whitespace {
                    slug.push('-');
                }
                in_whitespace = true;
                continue;
            }
            in_whitespace = false;
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                slug.push(c);
            }
        }

        let mut collapsed = String::with_capacity(slug.len());
        for c in slug.chars() {
            if c == '-' && collapsed.ends_with('-') {
                continue;
            }
            collapsed.push(c);
        }

        collapsed.trim_matches('-').to_string()
    }
}

pub mod keys {
    /// Extension of an uploaded file name, lowercased. Defaults to `jpg`.
    pub fn file_extension(filename: &str) -> String {
        match filename.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
            _ => "jpg".to_string(),
        }
    }

    pub fn thumbnail_key(slug: &str, ext: &str) -> String {
        format!("stories/{slug}/thumbnail.{ext}")
    }

    /// `stories/{slug}/chapters/{chapter}/page_{page}.{ext}`. Integral chapter
    /// numbers render without a fractional part.
    pub fn chapter_page_key(slug: &str, chapter_number: f64, page_number: usize, ext: &str) -> String {
        format!("stories/{slug}/chapters/{chapter_number}/page_{page_number}.{ext}")
    }
}

pub mod genres {
    const VN_TO_EN: &[(&str, &str)] = &[
        ("Hành động", "Action"),
        ("Phiêu lưu", "Adventure"),
        ("Hài hước", "Comedy"),
        ("Chính kịch", "Drama"),
        ("Kỳ ảo", "Fantasy"),
        ("Kinh dị", "Horror"),
        ("Bí ẩn", "Mystery"),
        ("Lãng mạn", "Romance"),
        ("Khoa học viễn tưởng", "Sci-Fi"),
        ("Đời thường", "Slice of Life"),
        ("Thể thao", "Sports"),
        ("Siêu nhiên", "Supernatural"),
        ("Giả tưởng", "Fantasy"),
    ];

    pub fn to_english(label: &str) -> &str {
        VN_TO_EN
            .iter()
            .find(|(vn, _)| *vn == label)
            .map(|(_, en)| *en)
            .unwrap_or(label)
    }

    /// Splits a comma-joined genre column and translates each label.
    pub fn split_translated(genres: Option<&str>) -> Vec<String> {
        genres
            .map(|g| {
                g.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(|g| to_english(g).to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub mod mime {
    pub fn detect_mime_type(data: &[u8]) -> &'static str {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            "image/jpeg"
        } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            "image/png"
        } else if data.starts_with(&[0x47, 0x49, 0x46, 0x38]) {
            "image/gif"
        } else if data.starts_with(&[0x52, 0x49, 0x46, 0x46])
            && data.len() > 12
            && &data[8..12] == b"WEBP"
        {
            "image/webp"
        } else {
            "application/octet-stream"
        }
    }

    pub fn content_type_for_extension(ext: &str) -> &'static str {
        match ext {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        }
    }
}
