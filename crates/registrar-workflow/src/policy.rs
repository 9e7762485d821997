// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Who may do what to a result record.
//
//   create / submit / revise   author, lecturer of the record's department, admin
//   approve / deny / publish   faculty officer of the record's faculty, admin

use registrar_core::error::{RegistrarError, Result};
use registrar_core::types::{Principal, ResultRecord, Role};

/// Whether `actor` may create results for `department`.
pub fn can_author(actor: &Principal, department: &str) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Lecturer => actor.department.as_deref() == Some(department),
        Role::Student | Role::Faculty => false,
    }
}

/// Whether `actor` may edit (submit or revise) `record`.
pub fn can_edit(actor: &Principal, record: &ResultRecord) -> bool {
    if actor.role == Role::Student {
        return false;
    }
    actor.id == record.author_id || can_author(actor, &record.department)
}

/// Whether `actor` may decide on (approve, deny, publish) `record`.
pub fn can_decide(actor: &Principal, record: &ResultRecord) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Faculty => actor.faculty.as_deref() == Some(record.faculty.as_str()),
        Role::Student | Role::Lecturer => false,
    }
}

/// `Ok` if `allowed`, else `Unauthorized` for `action`.
pub fn require(allowed: bool, actor: &Principal, action: &str) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(RegistrarError::Unauthorized {
            actor: actor.id,
            action: action.to_owned(),
        })
    }
}
