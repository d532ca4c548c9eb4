use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;

use super::repo::{self, Issue, NewIssue, REPORT_POINTS};
use crate::photos::services::{delete_uploaded, upload_photos, UploadItem};
use crate::state::AppState;
use crate::triage::run_triage;
use crate::users;

pub struct CreatedIssue {
    pub issue: Issue,
    pub photo_ids: Vec<Uuid>,
    /// False when a replayed `client_ref` matched an existing report.
    pub created: bool,
}

/// Creates an issue with its photos. Objects are uploaded first, then the
/// issue row, photo links and the reporter's point award commit in one
/// transaction; any path that leaves the row uncommitted deletes the
/// freshly uploaded objects. After a real commit a triage task is spawned.
pub async fn create_issue_with_photos(
    st: &AppState,
    new: NewIssue<'_>,
    images: Vec<UploadItem>,
) -> anyhow::Result<CreatedIssue> {
    let issue_id = Uuid::new_v4();
    let reporter_id = new.reporter_id;

    let uploaded = upload_photos(st, reporter_id, issue_id, images).await?;

    let persisted: anyhow::Result<Option<Issue>> = async {
        let mut tx = st.db.begin().await.context("begin issue tx")?;
        let Some(issue) = repo::insert_tx(&mut tx, issue_id, &new).await? else {
            tx.rollback().await.ok();
            return Ok(None);
        };
        for p in &uploaded {
            crate::photos::repo::insert_photo_tx(&mut tx, p.id, issue_id, &p.key, &p.content_type)
                .await?;
        }
        users::repo::award_report_tx(&mut tx, reporter_id, REPORT_POINTS).await?;
        tx.commit().await.context("commit issue tx")?;
        Ok(Some(issue))
    }
    .await;

    let issue = match persisted {
        Ok(Some(issue)) => issue,
        Ok(None) => {
            // Replayed offline submission: keep the original, drop the orphans.
            delete_uploaded(st, &uploaded).await;
            let client_ref = new.client_ref.context("conflict without client_ref")?;
            let existing = repo::find_by_client_ref(&st.db, reporter_id, client_ref)
                .await?
                .context("conflicting issue vanished")?;
            let photo_ids = crate::photos::repo::list_by_issue(&st.db, existing.id)
                .await?
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            info!(issue_id = %existing.id, %client_ref, "replayed submission deduplicated");
            return Ok(CreatedIssue {
                issue: existing,
                photo_ids,
                created: false,
            });
        }
        Err(e) => {
            delete_uploaded(st, &uploaded).await;
            return Err(e);
        }
    };

    info!(%issue_id, %reporter_id, photos = uploaded.len(), "issue created");

    let task_state = st.clone();
    let (title, description, category) = (
        issue.title.clone(),
        issue.description.clone(),
        issue.category.clone(),
    );
    tokio::spawn(async move {
        run_triage(task_state, issue_id, title, description, category).await;
    });

    Ok(CreatedIssue {
        issue,
        photo_ids: uploaded.into_iter().map(|p| p.id).collect(),
        created: true,
    })
}

/// Presigned URLs for every photo of an issue. Presign failures drop the
/// photo from the list rather than failing the whole view.
pub async fn photo_urls(st: &AppState, issue_id: Uuid, ttl_secs: u64) -> anyhow::Result<Vec<String>> {
    let mut urls = Vec::new();
    for (photo_id, key) in crate::photos::repo::list_by_issue(&st.db, issue_id).await? {
        match st.storage.presign_get(&key, ttl_secs).await {
            Ok(url) => urls.push(url),
            Err(e) => warn!(error = %e, %photo_id, "presign failed; skipping photo"),
        }
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;
    use crate::issues::repo::IssueCategory;
    use crate::storage::StorageClient;

    /// Records deletions so cleanup after a failed persist can be asserted.
    #[derive(Default)]
    struct TrackingStorage {
        deleted: Mutex<Vec<String>>,
    }

    #[axum::async_trait]
    impl StorageClient for TrackingStorage {
        async fn put_object(&self, _k: &str, _b: Bytes, _ct: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_object(&self, k: &str) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(k.to_string());
            Ok(())
        }
        async fn presign_get(&self, k: &str, _s: u64) -> anyhow::Result<String> {
            Ok(format!("https://fake.local/{}", k))
        }
    }

    #[tokio::test]
    async fn failed_persist_deletes_uploaded_objects() {
        let storage = Arc::new(TrackingStorage::default());
        let mut st = AppState::fake();
        st.storage = storage.clone();

        // The reporter row does not exist, so the insert can never commit.
        let res = create_issue_with_photos(
            &st,
            NewIssue {
                reporter_id: Uuid::new_v4(),
                title: "Pothole",
                description: "Deep one",
                category: IssueCategory::Pothole,
                lat: 52.5,
                lng: 13.4,
                address: None,
                client_ref: None,
            },
            vec![UploadItem {
                body: Bytes::from_static(b"fake-jpeg"),
                content_type: "image/jpeg".into(),
            }],
        )
        .await;

        assert!(res.is_err());
        let deleted = storage.deleted.lock().unwrap();
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].ends_with(".jpg"));
    }
}
