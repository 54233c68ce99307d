use parley_db::DbPool;
use parley_models::PaymentStatus;
use regex::Regex;
use std::sync::LazyLock;

/// Marker substituted for every redacted match. Contains no digits, `@` or
/// keywords, so re-masking already-masked text is a no-op.
pub const REDACTION_MARKER: &str = "[hidden]";

// The pass order is a policy choice: phone, then email, then telegram, then
// whatsapp, then address keywords, each pass operating on the output of the
// previous one. Reordering changes observable output (the telegram pass
// would otherwise eat the local part of emails via its @handle pattern).
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s().\-]{6,}\d").expect("phone pattern"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email pattern")
});
static TELEGRAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?t(?:elegram)?\.me/\w+|@\w{4,}").expect("telegram pattern")
});
static WHATSAPP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:wa\.me|chat\.whatsapp\.com|api\.whatsapp\.com)/\S+")
        .expect("whatsapp pattern")
});
static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:address|street|avenue|building|block|district|floor|apartment)\b")
        .expect("address pattern")
});

/// Redact contact information from outgoing message text.
pub fn mask_sensitive_data(text: &str) -> String {
    let mut masked = PHONE.replace_all(text, REDACTION_MARKER).into_owned();
    masked = EMAIL.replace_all(&masked, REDACTION_MARKER).into_owned();
    masked = TELEGRAM.replace_all(&masked, REDACTION_MARKER).into_owned();
    masked = WHATSAPP.replace_all(&masked, REDACTION_MARKER).into_owned();
    ADDRESS.replace_all(&masked, REDACTION_MARKER).into_owned()
}

/// Whether outgoing text for this listing must be redacted. Masking is
/// lifted only once the deal's commission is fully paid; everything else,
/// including lookup failures, masks (fail-safe).
pub async fn should_mask(pool: &DbPool, listing_id: Option<i64>) -> bool {
    let Some(listing_id) = listing_id else {
        return true;
    };

    match parley_db::commissions::get_commission_for_listing(pool, listing_id).await {
        Ok(Some(commission)) => {
            let overall_paid = PaymentStatus::parse(&commission.status).is_paid();
            let both_parties_paid = PaymentStatus::parse(&commission.client_payment_status)
                .is_paid()
                && PaymentStatus::parse(&commission.owner_payment_status).is_paid();
            !(overall_paid || both_parties_paid)
        }
        Ok(None) => true,
        Err(err) => {
            tracing::warn!(listing_id, "commission lookup failed, masking: {err}");
            true
        }
    }
}
