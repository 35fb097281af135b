//! # Validation
//!
//! Field rules for a [`ProjectSubmission`].
//!
//! [`validate`] never fails and never stops early: it returns every violation
//! it finds, ordered by field (see [`Field`]). Rules run in two passes:
//!
//! 1. single-field rules, one verdict per field, in field order;
//! 2. cross-field rules (commission profiles, profile expiry, date range),
//!    also in field order.
//!
//! Cross-field rules only look at values that are present, so a missing start
//! date is reported once by pass 1 and ignored by pass 2.
//!
//! [`check_arabic_script`] is separate and short-circuits: callers run it
//! first and reject the submission on its single violation without running
//! [`validate`] at all.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::allocation::MAX_VALUE;
use crate::types::ProjectSubmission;

const CIF_MIN_LEN: usize = 5;
const CIF_MAX_LEN: usize = 9;
const PROFILE_ID_MAX_LEN: usize = 20;
const PROJECT_ID_MAX_LEN: usize = 30;
const NAME_MAX_LEN: usize = 150;
const ADDRESS_MAX_LEN: usize = 250;
const PHONE_MIN_DIGITS: usize = 7;
const PHONE_MAX_DIGITS: usize = 15;

/// Submission fields, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Cif,
    CommissionProfile,
    SecondaryProfile,
    ProfileExpiry,
    ClientId,
    ProjectId,
    NameEn,
    NameAr,
    LicenseNumber,
    LicenseExpiry,
    StartDate,
    EndDate,
    Value,
    UnitCount,
    DeveloperNameEn,
    DeveloperNameAr,
    SiteAddresses,
    Email,
    Phone,
    /// Not a form field; used by the distribution toggle.
    DistributionAction,
    /// Inclusion account number.
    Iban,
    /// Status filter of a listing.
    Status,
}

/// One broken rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: Field,
    /// Message catalog key.
    pub code: &'static str,
}

impl FieldViolation {
    pub fn new(field: Field, code: &'static str) -> Self {
        Self { field, code }
    }
}

/// Reject names in Arabic slots that carry no Arabic-script character.
///
/// Runs before [`validate`] and stops at the first offending field. Blank
/// values pass here; the rule list reports them as missing.
pub fn check_arabic_script(submission: &ProjectSubmission) -> Result<(), FieldViolation> {
    let slots = [
        (Field::NameAr, &submission.name_ar, "name_ar.not_arabic"),
        (
            Field::DeveloperNameAr,
            &submission.developer_name_ar,
            "developer_name_ar.not_arabic",
        ),
    ];
    for (field, value, code) in slots {
        if !value.trim().is_empty() && !contains_arabic(value) {
            return Err(FieldViolation::new(field, code));
        }
    }
    Ok(())
}

fn contains_arabic(value: &str) -> bool {
    value.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}

/// Validate a submission against every field and cross-field rule.
///
/// `today` is the business date used for expiry checks.
pub fn validate(submission: &ProjectSubmission, today: NaiveDate) -> Vec<FieldViolation> {
    let mut out = Vec::new();
    single_field_rules(submission, today, &mut out);
    cross_field_rules(submission, today, &mut out);
    out
}

fn single_field_rules(s: &ProjectSubmission, today: NaiveDate, out: &mut Vec<FieldViolation>) {
    let mut push = |field, verdict: Option<&'static str>| {
        if let Some(code) = verdict {
            out.push(FieldViolation::new(field, code));
        }
    };

    push(Field::Cif, check_cif(&s.cif));
    push(
        Field::CommissionProfile,
        check_profile_id(s.commission_profile_id.as_deref(), "commission_profile.invalid"),
    );
    push(
        Field::SecondaryProfile,
        check_profile_id(s.secondary_profile_id.as_deref(), "secondary_profile.invalid"),
    );
    push(Field::ClientId, required(&s.client_id, "client_id.required"));
    push(Field::ProjectId, check_project_id(&s.project_id));
    push(
        Field::NameEn,
        check_name(&s.name_en, "name_en.required", "name_en.too_long"),
    );
    push(
        Field::NameAr,
        check_name(&s.name_ar, "name_ar.required", "name_ar.too_long"),
    );
    push(
        Field::LicenseNumber,
        required(&s.license_number, "license_number.required"),
    );
    push(Field::LicenseExpiry, check_license_expiry(s.license_expiry, today));
    push(
        Field::StartDate,
        s.start_date.is_none().then_some("start_date.required"),
    );
    push(
        Field::EndDate,
        s.end_date.is_none().then_some("end_date.required"),
    );
    push(Field::Value, check_value(s.value));
    push(
        Field::UnitCount,
        match s.unit_count {
            None => Some("unit_count.required"),
            Some(0) => Some("unit_count.zero"),
            Some(_) => None,
        },
    );
    push(
        Field::DeveloperNameEn,
        check_name(
            &s.developer_name_en,
            "developer_name_en.required",
            "developer_name_en.too_long",
        ),
    );
    push(
        Field::DeveloperNameAr,
        check_name(
            &s.developer_name_ar,
            "developer_name_ar.required",
            "developer_name_ar.too_long",
        ),
    );
    push(Field::SiteAddresses, check_addresses(&s.site_addresses));
    push(Field::Email, check_email(&s.email));
    push(Field::Phone, check_phone(&s.phone));
}

fn cross_field_rules(s: &ProjectSubmission, today: NaiveDate, out: &mut Vec<FieldViolation>) {
    let primary = non_blank(s.commission_profile_id.as_deref());
    let secondary = non_blank(s.secondary_profile_id.as_deref());

    if let Some(secondary) = secondary {
        match primary {
            None => out.push(FieldViolation::new(
                Field::SecondaryProfile,
                "secondary_profile.requires_primary",
            )),
            Some(primary) if primary == secondary => out.push(FieldViolation::new(
                Field::SecondaryProfile,
                "secondary_profile.same_as_primary",
            )),
            Some(_) => {}
        }
        if s.profile_expiry.is_none() {
            out.push(FieldViolation::new(
                Field::ProfileExpiry,
                "profile_expiry.required",
            ));
        }
    }

    if let Some(expiry) = s.profile_expiry {
        if expiry == today {
            out.push(FieldViolation::new(Field::ProfileExpiry, "profile_expiry.today"));
        } else if expiry < today {
            out.push(FieldViolation::new(Field::ProfileExpiry, "profile_expiry.past"));
        }
        if let Some(start) = s.start_date {
            if expiry <= start {
                out.push(FieldViolation::new(
                    Field::ProfileExpiry,
                    "profile_expiry.not_after_start",
                ));
            }
        }
    }

    if let (Some(start), Some(end)) = (s.start_date, s.end_date) {
        if end == start {
            out.push(FieldViolation::new(Field::EndDate, "end_date.equals_start"));
        } else if end < start {
            out.push(FieldViolation::new(Field::EndDate, "end_date.before_start"));
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required(value: &str, code: &'static str) -> Option<&'static str> {
    value.trim().is_empty().then_some(code)
}

fn check_cif(cif: &str) -> Option<&'static str> {
    let cif = cif.trim();
    if cif.is_empty() {
        Some("cif.required")
    } else if !cif.chars().all(|c| c.is_ascii_digit()) {
        Some("cif.not_numeric")
    } else if !(CIF_MIN_LEN..=CIF_MAX_LEN).contains(&cif.len()) {
        Some("cif.length")
    } else {
        None
    }
}

fn check_profile_id(value: Option<&str>, code: &'static str) -> Option<&'static str> {
    let value = non_blank(value)?;
    let well_formed = value.len() <= PROFILE_ID_MAX_LEN
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    (!well_formed).then_some(code)
}

fn check_project_id(value: &str) -> Option<&'static str> {
    let value = value.trim();
    if value.is_empty() {
        return Some("project_id.required");
    }
    let well_formed = value.len() <= PROJECT_ID_MAX_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/'));
    (!well_formed).then_some("project_id.invalid")
}

fn check_name(
    value: &str,
    missing: &'static str,
    too_long: &'static str,
) -> Option<&'static str> {
    let value = value.trim();
    if value.is_empty() {
        Some(missing)
    } else if value.chars().count() > NAME_MAX_LEN {
        Some(too_long)
    } else {
        None
    }
}

fn check_license_expiry(expiry: Option<NaiveDate>, today: NaiveDate) -> Option<&'static str> {
    match expiry {
        None => Some("license_expiry.required"),
        Some(date) if date <= today => Some("license_expiry.expired"),
        Some(_) => None,
    }
}

fn check_value(value: Option<Decimal>) -> Option<&'static str> {
    match value {
        None => Some("value.required"),
        Some(v) if v.is_sign_negative() && !v.is_zero() => Some("value.negative"),
        Some(v) if v > MAX_VALUE => Some("value.too_large"),
        Some(_) => None,
    }
}

fn check_addresses(addresses: &[String]) -> Option<&'static str> {
    if addresses.iter().all(|a| a.trim().is_empty()) {
        Some("site_addresses.required")
    } else if addresses
        .iter()
        .any(|a| a.trim().chars().count() > ADDRESS_MAX_LEN)
    {
        Some("site_addresses.too_long")
    } else {
        None
    }
}

fn check_email(email: &str) -> Option<&'static str> {
    let email = email.trim();
    if email.is_empty() {
        return Some("email.required");
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Some("email.invalid");
    };
    let well_formed = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);
    (!well_formed).then_some("email.invalid")
}

fn check_phone(phone: &str) -> Option<&'static str> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Some("phone.required");
    }
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let well_formed = digits.chars().all(|c| c.is_ascii_digit())
        && (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits.len());
    (!well_formed).then_some("phone.invalid")
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
