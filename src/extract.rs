use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::{header::CONTENT_TYPE, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;

use crate::images::ImageUpload;

/// Edit payload sent either as JSON or as a multipart form. Forms may carry
/// an image file; JSON bodies never do.
pub enum JsonOrForm<T> {
    Json(T),
    Form(Multipart),
}

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = (StatusCode, String);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_form {
            let mp = Multipart::from_request(req, state)
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
            Ok(Self::Form(mp))
        } else {
            let Json(body) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
            Ok(Self::Json(body))
        }
    }
}

/// Text fields and the `image` file of a multipart form.
#[derive(Debug, Default)]
pub struct FormFields {
    text: HashMap<String, String>,
    pub image: Option<ImageUpload>,
}

impl FormFields {
    pub async fn read(mp: &mut Multipart) -> Result<Self, (StatusCode, String)> {
        let mut form = Self::default();
        while let Some(field) = mp
            .next_field()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
                form.image = Some(ImageUpload::from_field(
                    body,
                    file_name.as_deref(),
                    content_type.as_deref(),
                ));
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
                form.text.insert(name, value);
            }
        }
        Ok(form)
    }

    /// Removes and returns a text field.
    pub fn take(&mut self, name: &str) -> Option<String> {
        self.text.remove(name)
    }
}
