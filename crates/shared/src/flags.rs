//! Recognized notification-flag metadata keys.
//!
//! A flag is the presence of a non-empty value under one of these keys on the
//! remote billing object. Flags are only ever set, never cleared; they are the
//! sole mechanism preventing duplicate event emission.

/// Flag keys stored on subscription metadata.
pub mod subscription_flags {
    /// Set once the organization has been told its trial is about to end.
    pub const NOTIFIED_TRIAL_ENDING: &str = "notifiedTrialEnding";
    /// Set once the organization has been told its trial ended.
    pub const NOTIFIED_TRIAL_ENDED: &str = "notifiedTrialEnded";
}

/// Flag keys stored on invoice metadata.
///
/// Payment-failure flags live on the invoice, not the subscription: a new
/// billing period means a new invoice and a legitimately new failure to
/// notify about.
pub mod invoice_flags {
    /// Set once the payment-method owner has been notified of a failure.
    pub const NOTIFIED_ADMIN_PAYMENT_FAILED: &str = "notifiedAdminPaymentFailed";
    /// Set once all organization members have been notified of a failure.
    pub const NOTIFIED_ALL_MEMBERS_PAYMENT_FAILED: &str = "notifiedAllMembersPaymentFailed";
}

/// Metadata keys read from the billing customer object.
pub mod customer_keys {
    /// big-poppa user id of the payment-method owner.
    pub const PAYMENT_METHOD_OWNER_ID: &str = "paymentMethodOwnerId";
    /// Github id of the payment-method owner.
    pub const PAYMENT_METHOD_OWNER_GITHUB_ID: &str = "paymentMethodOwnerGithubId";
}
