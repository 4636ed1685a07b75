//! The full collaboration round trip between an owner and a writer.

use anyhow::Result;

use vellum::{ErrorKind, NewDocument};
use vellum_core::{BranchStatus, MergeSource, Permission};
use vellum_testkit::{init_tracing, TestNetwork};

#[tokio::test]
async fn owner_merges_a_collaborators_suggestion() -> Result<()> {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.join("alice").await?;
    let bob = network.join("bob").await?;

    let doc = alice
        .client
        .documents()
        .create_document(NewDocument::new("Spec", "Hello").with_tags(["draft"]))
        .await?;
    alice
        .client
        .sharing()
        .share_document(&doc.id, &bob.user, Permission::Write)
        .await?;

    let shared = bob.client.sharing().get_shared_documents().await?;
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].title, "Spec");
    assert_eq!(shared[0].tags, vec!["draft".to_string()]);

    let branch = bob.client.branches().create_branch(&doc.id).await?;
    let preview = bob
        .client
        .branches()
        .merge_from_branch(&branch.id, MergeSource::Main)
        .await?;
    assert!(preview.diff.is_empty());

    bob.client
        .branches()
        .update_branch(&branch.id, "Hello world")
        .await?;
    bob.client.branches().submit_branch(&branch.id).await?;

    let diff = alice.client.branches().branch_diff(&branch.id).await?;
    assert_eq!(diff.insertions, 1);
    assert_eq!(diff.deletions, 1);

    let merged = alice.client.branches().merge_branch(&branch.id).await?;
    assert_eq!(merged.status, BranchStatus::Merged);
    assert_eq!(merged.reviewed_by.as_ref(), Some(&alice.user));

    let root = alice
        .client
        .documents()
        .get_document(&doc.id)
        .await?
        .expect("root present");
    assert_eq!(root.content, "Hello world");
    assert_eq!(root.title, "Spec");

    let seen_by_bob = bob
        .client
        .documents()
        .get_document(&doc.id)
        .await?
        .expect("root present");
    assert_eq!(seen_by_bob.content, "Hello world");

    let err = bob
        .client
        .branches()
        .delete_branch(&branch.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let listed = alice.client.branches().list_branches(&doc.id).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, BranchStatus::Merged);

    // Views serialize for presentation layers.
    let json = serde_json::to_value(&listed[0])?;
    assert_eq!(json["status"], "merged");
    Ok(())
}
