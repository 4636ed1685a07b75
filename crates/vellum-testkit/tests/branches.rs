//! Branch lifecycle: forking, editing, review and deletion.

use anyhow::Result;

use vellum::{ErrorKind, NewDocument, StoreDirectory, Vellum};
use vellum_core::{BranchStatus, DocumentId, MergeSource, Permission};
use vellum_store::MemoryStore;
use vellum_testkit::{init_tracing, Member, TestNetwork};

type Client = Vellum<MemoryStore, StoreDirectory<MemoryStore>>;

/// Alice owns a private document shared with bob at `permission`.
async fn shared_document(
    network: &TestNetwork,
    permission: Permission,
) -> Result<(Member, Member, DocumentId)> {
    let alice = network.join("alice").await?;
    let bob = network.join("bob").await?;
    let doc = alice
        .client
        .documents()
        .create_document(NewDocument::new("Spec", "line one\nline two\n"))
        .await?;
    alice
        .client
        .sharing()
        .share_document(&doc.id, &bob.user, permission)
        .await?;
    Ok((alice, bob, doc.id))
}

async fn root_content(client: &Client, id: &DocumentId) -> Result<String> {
    Ok(client
        .documents()
        .get_document(id)
        .await?
        .expect("root present")
        .content)
}

#[tokio::test]
async fn nested_branches_point_at_the_root() -> Result<()> {
    init_tracing();
    let network = TestNetwork::new();
    let (_alice, bob, root) = shared_document(&network, Permission::Read).await?;

    let a = bob.client.branches().create_branch(&root).await?;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let b = bob.client.branches().create_branch(&a.id).await?;

    assert_eq!(a.original, root);
    assert_eq!(a.parent, root);
    assert_eq!(b.original, root);
    assert_eq!(b.parent, a.id);
    assert_eq!(b.status, BranchStatus::Pending);
    assert_eq!(b.content, "line one\nline two\n");
    assert_eq!(b.created_by, bob.user);

    let listed = bob.client.branches().list_branches(&root).await?;
    let ids: Vec<_> = listed.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![a.id, b.id]);
    Ok(())
}

#[tokio::test]
async fn branch_lookups() -> Result<()> {
    let network = TestNetwork::new();
    let (alice, _bob, root) = shared_document(&network, Permission::Read).await?;
    let branches = alice.client.branches();

    let err = branches.get_branch(&root).await.unwrap_err();
    assert_eq!(err.to_string(), "NOT_FOUND: Not a branch document");

    let err = branches.get_branch(&DocumentId::generate()).await.unwrap_err();
    assert_eq!(err.to_string(), "NOT_FOUND: Branch not found");

    let err = branches.create_branch(&DocumentId::generate()).await.unwrap_err();
    assert_eq!(err.to_string(), "NOT_FOUND: Parent document not found");

    assert!(branches.list_branches(&root).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn status_only_moves_forward() -> Result<()> {
    let network = TestNetwork::new();
    let (alice, bob, root) = shared_document(&network, Permission::Read).await?;
    let branch = bob.client.branches().create_branch(&root).await?;

    let err = alice.client.branches().merge_branch(&branch.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let submitted = bob.client.branches().submit_branch(&branch.id).await?;
    assert_eq!(submitted.status, BranchStatus::Submitted);
    assert!(submitted.submitted_at.is_some());

    let err = bob.client.branches().submit_branch(&branch.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // Submitted content is read-only.
    let err = bob
        .client
        .branches()
        .update_branch(&branch.id, "late edit")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "INVALID_STATE: Only pending branches can be edited");

    let rejected = alice
        .client
        .branches()
        .reject_branch(&branch.id, Some("  not now  ".into()))
        .await?;
    assert_eq!(rejected.status, BranchStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("not now"));
    assert_eq!(rejected.reviewed_by.as_ref(), Some(&alice.user));

    for result in [
        alice.client.branches().merge_branch(&branch.id).await,
        alice.client.branches().reject_branch(&branch.id, None).await,
        bob.client.branches().submit_branch(&branch.id).await,
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
    }
    let err = bob.client.branches().delete_branch(&branch.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    Ok(())
}

#[tokio::test]
async fn review_is_owner_only() -> Result<()> {
    let network = TestNetwork::new();
    let (_alice, bob, root) = shared_document(&network, Permission::Write).await?;
    let branch = bob.client.branches().create_branch(&root).await?;
    bob.client.branches().submit_branch(&branch.id).await?;

    let err = bob.client.branches().merge_branch(&branch.id).await.unwrap_err();
    assert_eq!(err.to_string(), "PERMISSION_DENIED: Only the owner can merge branches");
    let err = bob
        .client
        .branches()
        .reject_branch(&branch.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    Ok(())
}

#[tokio::test]
async fn only_the_creator_edits_a_branch() -> Result<()> {
    let network = TestNetwork::new();
    let (alice, bob, root) = shared_document(&network, Permission::Read).await?;
    let carol = network.join("carol").await?;
    let dave = network.join("dave").await?;
    let sharing = alice.client.sharing();
    sharing
        .share_document(&root, &carol.user, Permission::Write)
        .await?;
    sharing
        .share_document(&root, &dave.user, Permission::Read)
        .await?;

    let branch = bob.client.branches().create_branch(&root).await?;
    let edited = bob
        .client
        .branches()
        .update_branch(&branch.id, "bob was here")
        .await?;
    assert_eq!(edited.content, "bob was here");

    // Write access does not reach other people's branches, nor does ownership.
    for member in [&carol, &dave, &alice] {
        let err = member
            .client
            .branches()
            .update_branch(&branch.id, "overwritten")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied, "{}", member.user);
    }
    let preview = carol
        .client
        .branches()
        .merge_from_branch(&branch.id, MergeSource::Main)
        .await?;
    let err = carol.client.branches().apply_merge(&preview).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(
        bob.client.branches().get_branch(&branch.id).await?.content,
        "bob was here"
    );

    let err = dave.client.branches().submit_branch(&branch.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    let err = carol.client.branches().delete_branch(&branch.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    // Writers edit their own branches.
    let own = carol.client.branches().create_branch(&root).await?;
    carol
        .client
        .branches()
        .update_branch(&own.id, "carol was here")
        .await?;

    // Readers may view and diff.
    let diff = dave.client.branches().branch_diff(&branch.id).await?;
    assert_eq!(diff.insertions, 1);
    assert_eq!(diff.deletions, 2);
    Ok(())
}

#[tokio::test]
async fn edit_shared_document_reuses_the_pending_branch() -> Result<()> {
    let network = TestNetwork::new();
    let (alice, bob, root) = shared_document(&network, Permission::Read).await?;
    let branches = bob.client.branches();

    let first = branches.edit_shared_document(&root, "draft 1").await?;
    let second = branches.edit_shared_document(&root, "draft 2").await?;
    assert_eq!(first.id, second.id);
    assert_eq!(second.content, "draft 2");

    // The canonical copy is untouched.
    assert_eq!(root_content(&alice.client, &root).await?, "line one\nline two\n");

    branches.submit_branch(&first.id).await?;
    let third = branches.edit_shared_document(&root, "draft 3").await?;
    assert_ne!(third.id, first.id);
    assert_eq!(branches.list_branches(&root).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn merge_preview_then_apply() -> Result<()> {
    let network = TestNetwork::new();
    let (alice, bob, root) = shared_document(&network, Permission::Read).await?;
    let branch = bob.client.branches().create_branch(&root).await?;
    bob.client
        .branches()
        .update_branch(&branch.id, "line one\nmy edit\n")
        .await?;

    // Meanwhile the owner moves main forward.
    alice
        .client
        .documents()
        .update_document(
            &root,
            vellum::DocumentUpdate {
                content: Some("line one\nline two\nline three\n".into()),
                ..Default::default()
            },
        )
        .await?;

    let preview = bob
        .client
        .branches()
        .merge_from_branch(&branch.id, MergeSource::Main)
        .await?;
    assert_eq!(preview.source_id, root);
    assert_eq!(preview.source_content, "line one\nline two\nline three\n");
    assert!(!preview.diff.is_empty());
    assert!(preview.diff.unified.contains("-my edit"));
    assert!(preview.diff.unified.contains("+line three"));

    // Nothing written by the preview.
    let unchanged = bob.client.branches().get_branch(&branch.id).await?;
    assert_eq!(unchanged.content, "line one\nmy edit\n");

    let applied = bob.client.branches().apply_merge(&preview).await?;
    assert_eq!(applied.content, "line one\nline two\nline three\n");
    Ok(())
}

#[tokio::test]
async fn stale_merge_preview_is_refused() -> Result<()> {
    let network = TestNetwork::new();
    let (alice, bob, root) = shared_document(&network, Permission::Read).await?;
    let working = bob.client.branches().create_branch(&root).await?;
    let source = alice.client.branches().create_branch(&root).await?;
    alice
        .client
        .branches()
        .update_branch(&source.id, "from alice")
        .await?;

    let preview = bob
        .client
        .branches()
        .merge_from_branch(&working.id, MergeSource::Branch(source.id))
        .await?;
    assert_eq!(preview.source_id, source.id);

    alice
        .client
        .branches()
        .update_branch(&source.id, "from alice, revised")
        .await?;

    let err = bob.client.branches().apply_merge(&preview).await.unwrap_err();
    assert_eq!(err.to_string(), "INVALID_STATE: Merge source changed since the preview");

    let err = bob
        .client
        .branches()
        .merge_from_branch(&working.id, MergeSource::Branch(working.id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}

#[tokio::test]
async fn deleting_a_branch_leaves_siblings_and_key_alone() -> Result<()> {
    let network = TestNetwork::new();
    let (alice, bob, root) = shared_document(&network, Permission::Read).await?;
    let keep = bob.client.branches().create_branch(&root).await?;
    let doomed = bob.client.branches().create_branch(&root).await?;
    bob.client
        .branches()
        .update_branch(&keep.id, "still here")
        .await?;

    let updated_before = alice
        .client
        .documents()
        .get_document_metadata(&root)
        .await?
        .expect("present")
        .updated_at;

    bob.client.branches().delete_branch(&doomed.id).await?;

    let err = bob.client.branches().get_branch(&doomed.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let sibling = bob.client.branches().get_branch(&keep.id).await?;
    assert_eq!(sibling.content, "still here");

    // A fresh device has to unwrap the key again; the root still opens.
    let laptop = network.client_for(alice.identity.clone());
    assert_eq!(root_content(&laptop, &root).await?, "line one\nline two\n");
    let meta = alice
        .client
        .documents()
        .get_document_metadata(&root)
        .await?
        .expect("present");
    assert_eq!(meta.updated_at, updated_before);

    let listed = alice.client.branches().list_branches(&root).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, keep.id);
    Ok(())
}

#[tokio::test]
async fn owner_may_delete_a_submitted_branch() -> Result<()> {
    let network = TestNetwork::new();
    let (alice, bob, root) = shared_document(&network, Permission::Read).await?;
    let branch = bob.client.branches().create_branch(&root).await?;
    bob.client.branches().submit_branch(&branch.id).await?;

    alice.client.branches().delete_branch(&branch.id).await?;
    assert!(alice.client.branches().list_branches(&root).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn rotation_reseals_branches() -> Result<()> {
    let network = TestNetwork::new();
    let (alice, bob, root) = shared_document(&network, Permission::Read).await?;
    let branch = bob.client.branches().create_branch(&root).await?;
    bob.client
        .branches()
        .update_branch(&branch.id, "before rotation")
        .await?;

    alice
        .client
        .documents()
        .change_document_key(&root, vellum_perms::generate_key())
        .await?;

    let read = bob.client.branches().get_branch(&branch.id).await?;
    assert_eq!(read.content, "before rotation");

    alice.client.documents().set_document_public(&root).await?;
    let read = bob.client.branches().get_branch(&branch.id).await?;
    assert_eq!(read.content, "before rotation");
    Ok(())
}
