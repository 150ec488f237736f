use crate::metacard::Metacard;
use crate::operation::OperationContext;
use crate::policy::PolicyMap;
use crate::security::{Action, KeyValueCollectionPermission, Subject};

/// The subject an operation runs as: the one on the request, else guest.
pub fn effective_subject(context: &OperationContext) -> Subject {
    context.subject.clone().unwrap_or_else(Subject::guest)
}

/// Unions `policy` into the metacard's `security` attribute.
pub fn stamp_item_policy(metacard: &mut Metacard, policy: &PolicyMap) {
    if policy.is_empty() {
        return;
    }
    let merged = metacard.security().unwrap_or_default().merged(policy);
    metacard.set_security(&merged);
}

/// Whether the subject on `context` may read from something guarded by `required`.
pub fn may_read(context: &OperationContext, required: &PolicyMap) -> bool {
    if required.is_empty() {
        return true;
    }
    effective_subject(context).is_permitted(&KeyValueCollectionPermission::new(
        Action::Read,
        required.clone(),
    ))
}
