//! Multipart form collection.
//!
//! Handlers read the whole form up front, validate scalar fields, and only then
//! decode images. Field names are looked up by their camelCase name first and
//! then by the snake_case spelling.

use std::{collections::HashMap, str::FromStr};

use axum::body::Bytes;
use axum::extract::Multipart;
use image::DynamicImage;
use prism_core::{decode_rgb, Error};

use crate::error::HttpError;

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }

    /// Extension of the client's file name, including the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        let (_, ext) = name.rsplit_once('.')?;
        let ok = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
        ok.then(|| format!(".{}", ext.to_ascii_lowercase()))
    }
}

#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl Form {
    pub async fn collect(mut multipart: Multipart) -> Result<Self, HttpError> {
        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let binary = content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("image/") || ct == "application/octet-stream");
            if file_name.is_some() || binary {
                let bytes = field.bytes().await?;
                form.files.insert(
                    name,
                    Upload {
                        file_name,
                        content_type,
                        bytes,
                    },
                );
            } else {
                let text = field.text().await?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    fn lookup<'a, T>(map: &'a HashMap<String, T>, name: &str) -> Option<&'a T> {
        map.get(name).or_else(|| map.get(&snake_case(name)))
    }

    /// A non-blank text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        Self::lookup(&self.fields, name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn require_text(&self, name: &str) -> Result<&str, HttpError> {
        self.text(name)
            .ok_or_else(|| Error::invalid(name, "field is required").into())
    }

    pub fn parse<T>(&self, name: &str) -> Result<Option<T>, HttpError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| Error::invalid(name, format!("`{raw}`: {e}")).into())
            })
            .transpose()
    }

    pub fn parse_or<T>(&self, name: &str, default: T) -> Result<T, HttpError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse(name)?.unwrap_or(default))
    }

    /// Boolean field; absent means `default`.
    pub fn flag(&self, name: &str, default: bool) -> Result<bool, HttpError> {
        match self.text(name).map(str::to_ascii_lowercase).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes" | "on") => Ok(true),
            Some("false" | "0" | "no" | "off") => Ok(false),
            Some(other) => Err(Error::invalid(name, format!("`{other}` is not a boolean")).into()),
        }
    }

    pub fn file(&self, name: &str) -> Result<&Upload, HttpError> {
        Self::lookup(&self.files, name)
            .ok_or_else(|| Error::invalid(name, "file is required").into())
    }

    /// Decodes the named file into 8-bit RGB on the blocking pool.
    pub async fn image(&self, name: &str) -> Result<DynamicImage, HttpError> {
        let bytes = self.file(name)?.bytes.clone();
        Ok(tokio::task::spawn_blocking(move || decode_rgb(&bytes)).await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_and_snake_names_resolve() {
        let form = Form::default()
            .with_field("filter_type", "blur")
            .with_field("guidanceScale", " 9 ");
        assert_eq!(form.text("filterType"), Some("blur"));
        assert_eq!(form.parse::<f64>("guidanceScale").unwrap(), Some(9.0));
        assert_eq!(snake_case("useAi"), "use_ai");
    }

    #[test]
    fn bad_numbers_and_flags_are_rejected() {
        let form = Form::default()
            .with_field("steps", "many")
            .with_field("useAi", "maybe");
        assert_eq!(form.parse::<u32>("steps").unwrap_err().status().as_u16(), 400);
        assert!(form.flag("useAi", false).is_err());
        assert!(form.flag("preprocess", true).unwrap());
    }

    #[test]
    fn blank_fields_count_as_absent() {
        let form = Form::default().with_field("prompt", "   ");
        assert!(form.text("prompt").is_none());
        assert!(form.require_text("prompt").is_err());
    }

    #[test]
    fn extensions_are_sanitized() {
        let upload = |name: &str| Upload {
            file_name: Some(name.to_string()),
            content_type: Some("image/png".into()),
            bytes: Bytes::new(),
        };
        assert_eq!(upload("cat.PNG").extension().as_deref(), Some(".png"));
        assert_eq!(upload("noext").extension(), None);
        assert_eq!(upload("a.../../x").extension(), None);
    }
}
