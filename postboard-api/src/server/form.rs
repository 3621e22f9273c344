use crate::server::uploads::ImageUpload;
use axum::extract::{Multipart, multipart::MultipartError};
use postboard_common::model::post::{PostContent, ValidationErrors};

/// The image a submission refers to.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum ImageField {
    /// A newly uploaded file.
    Upload(ImageUpload),
    /// A previously stored image path, sent back as plain text.
    Existing(String),
}

/// The `title`, `content` and `image` parts of a post submission.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct PostForm {
    title: Option<String>,
    content: Option<String>,
    upload: Option<ImageUpload>,
    existing_image: Option<String>,
}

impl PostForm {
    /// Reads the whole body. Unknown parts are skipped and uploads that are
    /// empty or not png/jpeg count as no upload.
    pub async fn read(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            match field.name() {
                Some("title") => form.title = Some(field.text().await?),
                Some("content") => form.content = Some(field.text().await?),
                Some("image") if field.file_name().is_some() => {
                    let file_name = field.file_name().unwrap_or_default().to_owned();
                    let content_type = field.content_type().map(str::to_owned);
                    let upload = ImageUpload {
                        file_name,
                        content_type,
                        bytes: field.bytes().await?,
                    };
                    if upload.is_accepted() {
                        form.upload = Some(upload);
                    }
                }
                Some("image") => {
                    let path = field.text().await?;
                    let path = path.trim();
                    if !path.is_empty() {
                        form.existing_image = Some(path.to_owned());
                    }
                }
                _ => {}
            }
        }

        Ok(form)
    }

    /// Trimmed title and content, or every field error found.
    pub fn content(&self) -> Result<PostContent, ValidationErrors> {
        let content = PostContent::new(
            self.title.as_deref().unwrap_or_default(),
            self.content.as_deref().unwrap_or_default(),
        );
        content.validate()?;
        Ok(content)
    }

    /// The submitted image. An upload takes precedence over a path.
    #[must_use]
    pub fn into_image(self) -> Option<ImageField> {
        match (self.upload, self.existing_image) {
            (Some(upload), _) => Some(ImageField::Upload(upload)),
            (None, Some(path)) => Some(ImageField::Existing(path)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::server::{
        form::{ImageField, PostForm},
        uploads::ImageUpload,
    };
    use axum::body::Bytes;

    fn upload() -> ImageUpload {
        ImageUpload {
            file_name: "duck.png".to_owned(),
            content_type: Some("image/png".to_owned()),
            bytes: Bytes::from_static(b"png"),
        }
    }

    #[test]
    fn missing_fields_fail_validation() {
        let errors = PostForm::default().content().unwrap_err();

        assert_eq!(errors.to_string(), "Title must be at least 5 characters long.");
    }

    #[test]
    fn upload_wins_over_existing_path() {
        let form = PostForm {
            upload: Some(upload()),
            existing_image: Some("images/old.png".to_owned()),
            ..PostForm::default()
        };
        assert_eq!(form.into_image(), Some(ImageField::Upload(upload())));

        let form = PostForm {
            existing_image: Some("images/old.png".to_owned()),
            ..PostForm::default()
        };
        assert_eq!(
            form.into_image(),
            Some(ImageField::Existing("images/old.png".to_owned()))
        );

        assert_eq!(PostForm::default().into_image(), None);
    }
}
