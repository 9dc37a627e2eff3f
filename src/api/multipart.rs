//! `multipart/form-data` body parsing for uploads.

use anyhow::{anyhow, Result};

use super::http::{find, find_from};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FormPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Pull the `boundary` parameter out of a Content-Type header.
pub(crate) fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .split(';')
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
}

pub(crate) fn parse_form_data(body: &[u8], boundary: &str) -> Result<Vec<FormPart>> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut closing = b"\r\n".to_vec();
    closing.extend_from_slice(&delimiter);

    let mut cursor = find(body, &delimiter)
        .ok_or_else(|| anyhow!("multipart boundary not found"))?
        + delimiter.len();
    let mut parts = Vec::new();
    loop {
        let rest = &body[cursor..];
        if rest.starts_with(b"--") {
            break;
        }
        if !rest.starts_with(b"\r\n") {
            return Err(anyhow!("malformed multipart delimiter"));
        }
        let headers_start = cursor + 2;
        let headers_end = find_from(body, b"\r\n\r\n", headers_start)
            .ok_or_else(|| anyhow!("multipart part headers not terminated"))?;
        let data_start = headers_end + 4;
        let data_end = find_from(body, &closing, data_start)
            .ok_or_else(|| anyhow!("multipart part not terminated"))?;

        let headers = String::from_utf8_lossy(&body[headers_start..headers_end]);
        let mut part = FormPart {
            name: String::new(),
            file_name: None,
            content_type: None,
            data: body[data_start..data_end].to_vec(),
        };
        for line in headers.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key.trim().to_lowercase().as_str() {
                "content-disposition" => {
                    for param in value.split(';').skip(1) {
                        if let Some((k, v)) = param.trim().split_once('=') {
                            let v = v.trim().trim_matches('"').to_string();
                            match k.trim() {
                                "name" => part.name = v,
                                "filename" => part.file_name = Some(v),
                                _ => {}
                            }
                        }
                    }
                }
                "content-type" => part.content_type = Some(value.trim().to_string()),
                _ => {}
            }
        }
        parts.push(part);
        cursor = data_end + closing.len();
    }
    Ok(parts)
}
