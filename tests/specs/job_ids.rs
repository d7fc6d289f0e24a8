//! Safe job id specifications (spec scenario 6)

use warden_core::to_safe_job_id;

#[test]
fn colons_become_the_safe_separator() {
    assert_eq!(
        to_safe_job_id("verify:project-1:audit-1"),
        "verify__project-1__audit-1"
    );
}

#[test]
fn ids_without_colons_pass_through() {
    assert_eq!(to_safe_job_id("docs-index-123"), "docs-index-123");
}

#[test]
fn the_safe_separator_is_a_fixed_point() {
    let once = to_safe_job_id("verify:project-1:audit-1");
    assert_eq!(to_safe_job_id(&once), once);
}
