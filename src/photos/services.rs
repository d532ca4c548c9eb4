use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug)]
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

pub struct UploadedPhoto {
    pub id: Uuid,
    pub key: String,
    pub content_type: String,
}

/// Uploads images under a per-issue prefix. Runs before the issue
/// transaction; callers that abort afterwards call `delete_uploaded`.
pub async fn upload_photos(
    st: &AppState,
    reporter_id: Uuid,
    issue_id: Uuid,
    images: Vec<UploadItem>,
) -> anyhow::Result<Vec<UploadedPhoto>> {
    let mut uploaded = Vec::with_capacity(images.len());
    for img in images {
        let id = Uuid::new_v4();
        let ext = ext_from_mime(&img.content_type).unwrap_or("bin");
        let key = format!("issues/{}/{}-{}.{}", reporter_id, issue_id, id, ext);
        st.storage
            .put_object(&key, img.body, &img.content_type)
            .await
            .with_context(|| format!("put_object {}", key))?;
        uploaded.push(UploadedPhoto {
            id,
            key,
            content_type: img.content_type,
        });
    }
    Ok(uploaded)
}

/// Best-effort cleanup of objects whose issue never committed.
pub async fn delete_uploaded(st: &AppState, photos: &[UploadedPhoto]) {
    for p in photos {
        if let Err(e) = st.storage.delete_object(&p.key).await {
            warn!(error = %e, key = %p.key, "orphan photo cleanup failed");
        }
    }
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod photo_tests {
    use super::*;
    use crate::state::AppState;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
        assert_eq!(ext_from_mime("whatever/else"), None);
    }

    #[tokio::test]
    async fn test_upload_keys_carry_extension() {
        let state = AppState::fake();
        let reporter = Uuid::new_v4();
        let issue = Uuid::new_v4();
        let uploaded = upload_photos(
            &state,
            reporter,
            issue,
            vec![UploadItem {
                body: bytes::Bytes::from_static(b"fake-jpeg"),
                content_type: "image/jpeg".into(),
            }],
        )
        .await
        .unwrap();
        assert_eq!(uploaded.len(), 1);
        assert!(uploaded[0].key.starts_with(&format!("issues/{}/", reporter)));
        assert!(uploaded[0].key.ends_with(".jpg"));
    }
}
