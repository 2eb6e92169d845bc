//! Membership decision.

/// Returns true iff `identity` appears verbatim (case-sensitive) in `list`.
///
/// `None` means the local identity is not yet resolvable and is treated as
/// "not a member" rather than an error.
pub fn is_member<S: AsRef<str>>(list: &[S], identity: Option<&str>) -> bool {
    let Some(identity) = identity else {
        return false;
    };
    list.iter().any(|entry| entry.as_ref() == identity)
}
