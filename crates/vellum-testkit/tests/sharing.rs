//! Sharing, revocation and capability tokens.

use anyhow::Result;

use vellum::{ErrorKind, NewDocument};
use vellum_core::{Permission, UserId};
use vellum_perms::generate_key;
use vellum_store::{paths, GraphStore};
use vellum_testkit::{init_tracing, TestNetwork};

#[tokio::test]
async fn sharing_twice_updates_the_single_entry() -> Result<()> {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.join("alice").await?;
    let bob = network.join("bob").await?;
    let doc = alice
        .client
        .documents()
        .create_document(NewDocument::new("T", "C"))
        .await?;
    let sharing = alice.client.sharing();

    let first = sharing
        .share_document(&doc.id, &bob.user, Permission::Read)
        .await?;
    let second = sharing
        .share_document(&doc.id, &bob.user, Permission::Write)
        .await?;
    assert_eq!(second.granted_at, first.granted_at);

    let collaborators = sharing.get_collaborators(&doc.id).await?;
    let bobs: Vec<_> = collaborators
        .iter()
        .filter(|c| c.user_id == bob.user)
        .collect();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].permission, Permission::Write);
    assert_eq!(bobs[0].display_name, "Bob");

    // Owner first.
    assert_eq!(collaborators[0].user_id, alice.user);
    assert_eq!(collaborators[0].permission, Permission::Owner);
    Ok(())
}

#[tokio::test]
async fn collaborator_reads_through_their_wrapped_key() -> Result<()> {
    let network = TestNetwork::new();
    let alice = network.join("alice").await?;
    let bob = network.join("bob").await?;
    let doc = alice
        .client
        .documents()
        .create_document(NewDocument::new("Plan", "Secret plan").with_tags(["q3"]))
        .await?;
    alice
        .client
        .sharing()
        .share_document(&doc.id, &bob.user, Permission::Read)
        .await?;

    let read = bob.client.documents().get_document(&doc.id).await?.expect("present");
    assert_eq!(read.content, "Secret plan");
    assert_eq!(read.access.len(), 2);

    let shared = bob.client.sharing().get_shared_documents().await?;
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].id, doc.id);
    assert_eq!(shared[0].title, "Plan");
    assert_eq!(shared[0].permission, Permission::Read);
    assert_eq!(shared[0].owner, alice.user);

    // The owner's own documents are not "shared with" them.
    assert!(alice.client.sharing().get_shared_documents().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn sharing_rules() -> Result<()> {
    let network = TestNetwork::new();
    let alice = network.join("alice").await?;
    let bob = network.join("bob").await?;
    let doc = alice
        .client
        .documents()
        .create_document(NewDocument::new("T", "C"))
        .await?;
    let sharing = alice.client.sharing();

    let nobody = UserId::new("nobody")?;
    let err = sharing
        .share_document(&doc.id, &nobody, Permission::Read)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "NOT_FOUND: User not found");

    let err = sharing
        .share_document(&doc.id, &bob.user, Permission::Owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = sharing
        .share_document(&doc.id, &alice.user, Permission::Write)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    sharing
        .share_document(&doc.id, &bob.user, Permission::Write)
        .await?;
    let carol = network.join("carol").await?;
    let err = bob
        .client
        .sharing()
        .share_document(&doc.id, &carol.user, Permission::Read)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "PERMISSION_DENIED: Only the owner can share this document");

    let branch = bob.client.branches().create_branch(&doc.id).await?;
    let err = sharing
        .share_document(&branch.id, &carol.user, Permission::Read)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}

#[tokio::test]
async fn collaborators_of_a_missing_document() -> Result<()> {
    let network = TestNetwork::new();
    let alice = network.join("alice").await?;
    let err = alice
        .client
        .sharing()
        .get_collaborators(&vellum_core::DocumentId::generate())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "NOT_FOUND: Document not found");
    Ok(())
}

#[tokio::test]
async fn unsharing_revokes_visibility() -> Result<()> {
    let network = TestNetwork::new();
    let alice = network.join("alice").await?;
    let bob = network.join("bob").await?;
    let doc = alice
        .client
        .documents()
        .create_document(NewDocument::new("T", "C"))
        .await?;
    let sharing = alice.client.sharing();
    sharing
        .share_document(&doc.id, &bob.user, Permission::Read)
        .await?;
    assert!(bob.client.documents().get_document(&doc.id).await?.is_some());

    sharing.unshare_document(&doc.id, &bob.user).await?;
    // Idempotent.
    sharing.unshare_document(&doc.id, &bob.user).await?;

    let err = bob.client.documents().get_document(&doc.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(bob.client.sharing().get_shared_documents().await?.is_empty());
    assert!(sharing
        .get_collaborators(&doc.id)
        .await?
        .iter()
        .all(|c| c.user_id != bob.user));

    let err = sharing
        .unshare_document(&doc.id, &alice.user)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}

#[tokio::test]
async fn failed_share_restores_the_previous_entry() -> Result<()> {
    let network = TestNetwork::new();
    let alice = network.join("alice").await?;
    let bob = network.join("bob").await?;
    let doc = alice
        .client
        .documents()
        .create_document(NewDocument::new("T", "C"))
        .await?;
    let sharing = alice.client.sharing();
    sharing
        .share_document(&doc.id, &bob.user, Permission::Read)
        .await?;

    network
        .store
        .fail_writes_under(paths::inbox(&bob.user, &doc.id));
    let err = sharing
        .share_document(&doc.id, &bob.user, Permission::Write)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    network.store.clear_failures();

    let collaborators = sharing.get_collaborators(&doc.id).await?;
    let bob_entry = collaborators
        .iter()
        .find(|c| c.user_id == bob.user)
        .expect("bob still listed");
    assert_eq!(bob_entry.permission, Permission::Read);
    assert!(bob.client.documents().get_document(&doc.id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn share_token_opens_private_document_without_identity() -> Result<()> {
    let network = TestNetwork::new();
    let alice = network.join("alice").await?;
    let guest = network.join("guest").await?;
    let doc = alice
        .client
        .documents()
        .create_document(NewDocument::new("Invite", "See you there"))
        .await?;

    let token = alice
        .client
        .sharing()
        .generate_share_token(&doc.id, Permission::Read)
        .await?;
    assert_eq!(token.token.len(), 64);

    // The token is never stored; only its hash is.
    let raw_path = paths::token(&token.token);
    assert!(network.store.get(&raw_path).await?.is_none());

    guest.identity.sign_out();
    let read = guest.client.sharing().get_document_by_token(&token.token).await?;
    assert_eq!(read.content, "See you there");
    assert!(read.access.is_empty());
    Ok(())
}

#[tokio::test]
async fn share_token_errors_and_revocation() -> Result<()> {
    let network = TestNetwork::new();
    let alice = network.join("alice").await?;
    let bob = network.join("bob").await?;
    let doc = alice
        .client
        .documents()
        .create_document(NewDocument::new("T", "C").public())
        .await?;
    let sharing = alice.client.sharing();

    let err = bob
        .client
        .sharing()
        .get_document_by_token("not a token")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "VALIDATION_ERROR: Invalid share token");

    let err = sharing
        .generate_share_token(&doc.id, Permission::Owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = sharing
        .generate_share_token(&doc.id, Permission::Write)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "VALIDATION_ERROR: Share tokens grant read access only");
    assert!(network.store.list(&paths::doc_token_prefix(&doc.id)).await?.is_empty());

    let token = sharing
        .generate_share_token(&doc.id, Permission::Read)
        .await?;
    assert_eq!(
        bob.client.sharing().get_document_by_token(&token.token).await?.content,
        "C"
    );

    let err = bob
        .client
        .sharing()
        .revoke_share_token(&token.token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    sharing.revoke_share_token(&token.token).await?;
    let err = bob
        .client
        .sharing()
        .get_document_by_token(&token.token)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "NOT_FOUND: Share token not found");
    Ok(())
}

#[tokio::test]
async fn rotation_revokes_outstanding_tokens() -> Result<()> {
    let network = TestNetwork::new();
    let alice = network.join("alice").await?;
    let guest = network.join("guest").await?;
    let doc = alice
        .client
        .documents()
        .create_document(NewDocument::new("T", "C"))
        .await?;

    let token = alice
        .client
        .sharing()
        .generate_share_token(&doc.id, Permission::Read)
        .await?;
    alice
        .client
        .documents()
        .change_document_key(&doc.id, generate_key())
        .await?;

    let err = guest
        .client
        .sharing()
        .get_document_by_token(&token.token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}
