//! Máquina de estados de aprovação de planos terapêuticos e relatórios
//!
//! As transições legais vivem em uma única tabela ([`TRANSITIONS`]) consultada
//! tanto pelo código quanto pelos testes. [`attempt_transition`] é pura: não
//! lê nem escreve nada além dos seus argumentos.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::Principal;
use crate::error::{FieldError, WorkflowError, WorkflowResult};

/// Status de revisão de planos e relatórios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Rascunho, editável pelo terapeuta
    Draft,
    /// Enviado ao supervisor
    PendingApproval,
    /// Aprovado pelo supervisor (conteúdo congelado)
    Approved,
    /// Devolvido pelo supervisor com parecer
    Rejected,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 4] = [
        ApprovalStatus::Draft,
        ApprovalStatus::PendingApproval,
        ApprovalStatus::Approved,
        ApprovalStatus::Rejected,
    ];

    /// Estados em que o terapeuta responsável ainda pode editar o conteúdo
    pub fn is_editable(&self) -> bool {
        matches!(self, ApprovalStatus::Draft | ApprovalStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Draft => "draft",
            ApprovalStatus::PendingApproval => "pending_approval",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ApprovalStatus::Draft),
            "pending_approval" => Ok(ApprovalStatus::PendingApproval),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(format!("Valor de status inválido: {}", other)),
        }
    }
}

/// Quem pode disparar uma transição
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// O terapeuta autor do registro
    Owner,
    /// Qualquer supervisor
    Supervisor,
}

/// Linha da tabela de transições
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub from: ApprovalStatus,
    pub to: ApprovalStatus,
    pub actor: Actor,
}

/// Transições legais. `approved` não aparece como origem: é terminal.
pub const TRANSITIONS: &[Rule] = &[
    Rule {
        from: ApprovalStatus::Draft,
        to: ApprovalStatus::PendingApproval,
        actor: Actor::Owner,
    },
    Rule {
        from: ApprovalStatus::PendingApproval,
        to: ApprovalStatus::Approved,
        actor: Actor::Supervisor,
    },
    Rule {
        from: ApprovalStatus::PendingApproval,
        to: ApprovalStatus::Rejected,
        actor: Actor::Supervisor,
    },
    Rule {
        from: ApprovalStatus::Rejected,
        to: ApprovalStatus::Draft,
        actor: Actor::Owner,
    },
    Rule {
        from: ApprovalStatus::Rejected,
        to: ApprovalStatus::PendingApproval,
        actor: Actor::Owner,
    },
];

/// Procura a regra para o par (origem, destino)
pub fn rule_for(from: ApprovalStatus, to: ApprovalStatus) -> Option<&'static Rule> {
    TRANSITIONS.iter().find(|r| r.from == from && r.to == to)
}

/// Entidade sujeita à revisão do supervisor
pub trait Reviewable {
    fn approval_status(&self) -> ApprovalStatus;

    /// Terapeuta autor e responsável pelo registro
    fn author(&self) -> Uuid;

    /// Pendências que impedem o envio para aprovação; vazio quando pronto
    fn submission_issues(&self) -> Vec<FieldError>;
}

/// Alteração no parecer do supervisor decorrente de uma transição
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackChange {
    Keep,
    Set(Option<String>),
}

/// Resultado de uma transição aceita
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: ApprovalStatus,
    pub status: ApprovalStatus,
    pub feedback: FeedbackChange,
}

/// Decide se `principal` pode levar `entity` ao status `requested`
///
/// Ordem das verificações: par (origem, destino) fora da tabela gera
/// `InvalidTransition`; papel errado gera `Forbidden`; pré-condições não
/// atendidas geram `ValidationFailed`.
pub fn attempt_transition<E: Reviewable>(
    entity: &E,
    requested: ApprovalStatus,
    principal: &Principal,
    feedback: Option<&str>,
) -> WorkflowResult<TransitionOutcome> {
    let from = entity.approval_status();
    let rule = rule_for(from, requested).ok_or(WorkflowError::InvalidTransition {
        from,
        to: requested,
    })?;

    match (rule.actor, principal) {
        (Actor::Owner, Principal::Therapist(id)) if *id == entity.author() => {}
        (Actor::Owner, _) => {
            return Err(WorkflowError::Forbidden(format!(
                "Apenas o terapeuta responsável pode mover {} -> {}",
                from, requested
            )))
        }
        (Actor::Supervisor, Principal::Supervisor(_)) => {}
        (Actor::Supervisor, _) => {
            return Err(WorkflowError::Forbidden(format!(
                "Apenas supervisores podem mover {} -> {}",
                from, requested
            )))
        }
    }

    let feedback = feedback.map(str::trim).filter(|f| !f.is_empty());

    match requested {
        ApprovalStatus::PendingApproval => {
            let issues = entity.submission_issues();
            if !issues.is_empty() {
                return Err(WorkflowError::ValidationFailed(issues));
            }
        }
        ApprovalStatus::Rejected if feedback.is_none() => {
            return Err(WorkflowError::field(
                "feedback",
                "Parecer obrigatório ao rejeitar",
            ));
        }
        _ => {}
    }

    let feedback = match rule.actor {
        Actor::Supervisor => FeedbackChange::Set(feedback.map(str::to_string)),
        Actor::Owner => FeedbackChange::Keep,
    };

    Ok(TransitionOutcome {
        from,
        status: requested,
        feedback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        status: ApprovalStatus,
        author: Uuid,
        ready: bool,
    }

    impl Reviewable for Fake {
        fn approval_status(&self) -> ApprovalStatus {
            self.status
        }
        fn author(&self) -> Uuid {
            self.author
        }
        fn submission_issues(&self) -> Vec<FieldError> {
            if self.ready {
                Vec::new()
            } else {
                vec![FieldError::new("goals", "Pelo menos uma meta é obrigatória")]
            }
        }
    }

    fn fake(status: ApprovalStatus, author: Uuid) -> Fake {
        Fake {
            status,
            author,
            ready: true,
        }
    }

    /// Principal correto para a regra
    fn authorized(rule: &Rule, author: Uuid) -> Principal {
        match rule.actor {
            Actor::Owner => Principal::Therapist(author),
            Actor::Supervisor => Principal::Supervisor(Uuid::new_v4()),
        }
    }

    #[test]
    fn pairs_outside_table_are_invalid_for_everyone() {
        let author = Uuid::new_v4();
        let principals = [
            Principal::Therapist(author),
            Principal::Therapist(Uuid::new_v4()),
            Principal::Supervisor(Uuid::new_v4()),
            Principal::Restricted(Uuid::new_v4()),
        ];

        let mut illegal = 0;
        for from in ApprovalStatus::ALL {
            for to in ApprovalStatus::ALL {
                if rule_for(from, to).is_some() {
                    continue;
                }
                illegal += 1;
                for principal in &principals {
                    let err = attempt_transition(&fake(from, author), to, principal, Some("ok"))
                        .unwrap_err();
                    match err {
                        WorkflowError::InvalidTransition { from: f, to: t } => {
                            assert_eq!((f, t), (from, to));
                        }
                        other => panic!("esperado InvalidTransition, obtido {:?}", other),
                    }
                }
            }
        }
        assert_eq!(illegal, 16 - TRANSITIONS.len());
    }

    #[test]
    fn legal_pairs_with_wrong_principal_are_forbidden() {
        let author = Uuid::new_v4();
        for rule in TRANSITIONS {
            let wrong = match rule.actor {
                Actor::Owner => vec![
                    Principal::Supervisor(Uuid::new_v4()),
                    Principal::Therapist(Uuid::new_v4()),
                    Principal::Restricted(author),
                ],
                Actor::Supervisor => vec![
                    Principal::Therapist(author),
                    Principal::Restricted(Uuid::new_v4()),
                ],
            };
            for principal in wrong {
                let err = attempt_transition(&fake(rule.from, author), rule.to, &principal, Some("x"))
                    .unwrap_err();
                assert!(
                    matches!(err, WorkflowError::Forbidden(_)),
                    "{:?} -> {:?} por {:?}: {:?}",
                    rule.from,
                    rule.to,
                    principal,
                    err
                );
            }
        }
    }

    #[test]
    fn legal_pairs_with_right_principal_succeed() {
        let author = Uuid::new_v4();
        for rule in TRANSITIONS {
            let outcome = attempt_transition(
                &fake(rule.from, author),
                rule.to,
                &authorized(rule, author),
                Some("parecer"),
            )
            .unwrap();
            assert_eq!(outcome.from, rule.from);
            assert_eq!(outcome.status, rule.to);
        }
    }

    #[test]
    fn approving_an_approved_record_is_invalid() {
        let author = Uuid::new_v4();
        let err = attempt_transition(
            &fake(ApprovalStatus::Approved, author),
            ApprovalStatus::Approved,
            &Principal::Supervisor(Uuid::new_v4()),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidTransition {
                from: ApprovalStatus::Approved,
                to: ApprovalStatus::Approved
            }
        ));
    }

    #[test]
    fn reject_requires_feedback() {
        let author = Uuid::new_v4();
        let supervisor = Principal::Supervisor(Uuid::new_v4());
        let pending = fake(ApprovalStatus::PendingApproval, author);

        for empty in [None, Some(""), Some("   ")] {
            match attempt_transition(&pending, ApprovalStatus::Rejected, &supervisor, empty) {
                Err(WorkflowError::ValidationFailed(fields)) => {
                    assert_eq!(fields[0].field, "feedback");
                }
                other => panic!("esperado ValidationFailed, obtido {:?}", other),
            }
        }

        let outcome = attempt_transition(
            &pending,
            ApprovalStatus::Rejected,
            &supervisor,
            Some("needs more detail"),
        )
        .unwrap();
        assert_eq!(outcome.status, ApprovalStatus::Rejected);
        assert_eq!(
            outcome.feedback,
            FeedbackChange::Set(Some("needs more detail".to_string()))
        );
    }

    #[test]
    fn approve_sets_feedback_from_request() {
        let supervisor = Principal::Supervisor(Uuid::new_v4());
        let pending = fake(ApprovalStatus::PendingApproval, Uuid::new_v4());

        let outcome =
            attempt_transition(&pending, ApprovalStatus::Approved, &supervisor, None).unwrap();
        assert_eq!(outcome.feedback, FeedbackChange::Set(None));

        let outcome =
            attempt_transition(&pending, ApprovalStatus::Approved, &supervisor, Some("ótimo"))
                .unwrap();
        assert_eq!(outcome.feedback, FeedbackChange::Set(Some("ótimo".to_string())));
    }

    #[test]
    fn owner_transitions_keep_feedback() {
        let author = Uuid::new_v4();
        let outcome = attempt_transition(
            &fake(ApprovalStatus::Rejected, author),
            ApprovalStatus::PendingApproval,
            &Principal::Therapist(author),
            Some("ignorado"),
        )
        .unwrap();
        assert_eq!(outcome.feedback, FeedbackChange::Keep);
    }

    #[test]
    fn submission_checks_preconditions() {
        let author = Uuid::new_v4();
        let incomplete = Fake {
            status: ApprovalStatus::Draft,
            author,
            ready: false,
        };
        let err = attempt_transition(
            &incomplete,
            ApprovalStatus::PendingApproval,
            &Principal::Therapist(author),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::ValidationFailed(_)));

        // voltar a rascunho não revalida
        let rejected = Fake {
            status: ApprovalStatus::Rejected,
            author,
            ready: false,
        };
        assert!(attempt_transition(
            &rejected,
            ApprovalStatus::Draft,
            &Principal::Therapist(author),
            None
        )
        .is_ok());
    }
}
