//! Proptest generators for property-based testing.

use proptest::prelude::*;

use vellum::NewDocument;
use vellum_core::{BranchStatus, DocumentId, Permission, UserId};
use vellum_perms::{EncryptionKey, X25519StaticSecret};

/// Generate a random EncryptionKey.
pub fn encryption_key() -> impl Strategy<Value = EncryptionKey> {
    any::<[u8; 32]>().prop_map(EncryptionKey::from_bytes)
}

/// Generate a random X25519 secret.
pub fn static_secret() -> impl Strategy<Value = X25519StaticSecret> {
    any::<[u8; 32]>().prop_map(X25519StaticSecret::from_bytes)
}

/// Generate a random DocumentId.
pub fn document_id() -> impl Strategy<Value = DocumentId> {
    any::<[u8; 16]>().prop_map(DocumentId::from_bytes)
}

/// Generate a user alias that is a valid store path segment.
pub fn alias() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}".prop_map(String::from)
}

/// Generate a UserId.
pub fn user_id() -> impl Strategy<Value = UserId> {
    alias().prop_filter_map("valid user id", |a| UserId::new(a).ok())
}

/// Generate a non-blank title.
pub fn title() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,40}".prop_map(String::from)
}

/// Generate multi-line document content, possibly empty.
pub fn content() -> impl Strategy<Value = String> {
    prop::collection::vec("[ -~]{0,30}", 0..8).prop_map(|lines| lines.join("\n"))
}

/// Generate a tag list within the default limits.
pub fn tags() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z][a-z0-9-]{0,11}", 0..5)
}

/// Generate any permission level.
pub fn permission() -> impl Strategy<Value = Permission> {
    prop_oneof![
        Just(Permission::Read),
        Just(Permission::Write),
        Just(Permission::Owner),
    ]
}

/// Generate a permission that may be granted to a collaborator.
pub fn shareable_permission() -> impl Strategy<Value = Permission> {
    prop_oneof![Just(Permission::Read), Just(Permission::Write)]
}

/// Generate a branch status.
pub fn branch_status() -> impl Strategy<Value = BranchStatus> {
    prop_oneof![
        Just(BranchStatus::Pending),
        Just(BranchStatus::Submitted),
        Just(BranchStatus::Merged),
        Just(BranchStatus::Rejected),
    ]
}

/// Parameters for creating a document.
#[derive(Debug, Clone)]
pub struct DocumentParams {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub is_public: bool,
}

impl DocumentParams {
    pub fn to_new_document(&self) -> NewDocument {
        NewDocument {
            title: self.title.clone(),
            content: Some(self.content.clone()),
            tags: self.tags.clone(),
            is_public: self.is_public,
        }
    }
}

impl Arbitrary for DocumentParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (title(), content(), tags(), any::<bool>())
            .prop_map(|(title, content, tags, is_public)| DocumentParams {
                title,
                content,
                tags,
                is_public,
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::{validate_tags, validate_title, ValidationLimits};
    use vellum_perms::{wrap_context, KeyAgreement, Sealed, WrappedKey};

    proptest! {
        #[test]
        fn test_generated_documents_validate(params: DocumentParams) {
            let limits = ValidationLimits::default();
            prop_assert!(validate_title(&params.title, &limits).is_ok());
            prop_assert!(validate_tags(&params.tags, &limits).is_ok());
        }

        #[test]
        fn test_sealed_content_opens_only_with_its_key(
            key in encryption_key(),
            other in encryption_key(),
            body in content(),
        ) {
            prop_assume!(key.as_bytes() != other.as_bytes());
            let sealed = Sealed::seal(body.clone(), Some(&key)).unwrap();

            prop_assert_eq!(sealed.open(Some(&key)).unwrap(), body);
            prop_assert!(sealed.open(Some(&other)).is_err());
        }

        #[test]
        fn test_wrapped_key_reaches_recipient(
            owner in static_secret(),
            recipient in static_secret(),
            key in encryption_key(),
            doc in document_id(),
            user in user_id(),
        ) {
            let context = wrap_context(&doc, &user);
            let wrapped = WrappedKey::wrap(&key, &owner, &recipient.public_key(), &context).unwrap();
            let unwrapped = wrapped.unwrap(&recipient, &context).unwrap();
            prop_assert_eq!(unwrapped.as_bytes(), key.as_bytes());
        }
    }
}
