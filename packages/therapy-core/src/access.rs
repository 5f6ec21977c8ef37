//! Contexto de identidade e filtro de visibilidade
//!
//! Todo acesso a pacientes, planos, relatórios e avaliações passa por
//! [`compute_filter`], que traduz o papel do usuário autenticado em um
//! predicado de consulta. O predicado é puro; a camada de persistência o
//! traduz em condições SQL.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Papéis reconhecidos pelo sistema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Therapist,
    Supervisor,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Therapist => write!(f, "therapist"),
            Role::Supervisor => write!(f, "supervisor"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "therapist" => Ok(Role::Therapist),
            "supervisor" => Ok(Role::Supervisor),
            other => Err(format!("Papel inválido: {}", other)),
        }
    }
}

/// Usuário autenticado que realiza a requisição
///
/// Imutável durante toda a requisição. `Restricted` cobre contas autenticadas
/// cujo papel não é clínico (ex.: `patient`); elas não enxergam nenhum registro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Therapist(Uuid),
    Supervisor(Uuid),
    Restricted(Uuid),
}

impl Principal {
    /// Constrói o principal a partir do identificador e do papel declarado
    pub fn from_role_name(id: Uuid, role: &str) -> Self {
        match role.parse::<Role>() {
            Ok(Role::Therapist) => Principal::Therapist(id),
            Ok(Role::Supervisor) => Principal::Supervisor(id),
            Err(_) => Principal::Restricted(id),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Principal::Therapist(id) | Principal::Supervisor(id) | Principal::Restricted(id) => *id,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Principal::Therapist(_) => Some(Role::Therapist),
            Principal::Supervisor(_) => Some(Role::Supervisor),
            Principal::Restricted(_) => None,
        }
    }
}

/// Classes de entidade sujeitas ao controle de acesso
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    Patient,
    TherapyPlan,
    ProgressReport,
    ClinicalRating,
}

impl EntityClass {
    /// Tabela onde a entidade é persistida
    pub fn table(&self) -> &'static str {
        match self {
            EntityClass::Patient => "patients",
            EntityClass::TherapyPlan => "therapy_plans",
            EntityClass::ProgressReport => "progress_reports",
            EntityClass::ClinicalRating => "clinical_ratings",
        }
    }
}

impl std::fmt::Display for EntityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityClass::Patient => write!(f, "Patient"),
            EntityClass::TherapyPlan => write!(f, "Therapy plan"),
            EntityClass::ProgressReport => write!(f, "Progress report"),
            EntityClass::ClinicalRating => write!(f, "Clinical rating"),
        }
    }
}

/// Restrição de propriedade derivada do papel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Sem restrição de propriedade
    Everything,
    /// Apenas registros cujo terapeuta responsável é o informado
    OwnedBy(Uuid),
    /// Nenhum registro
    Nothing,
}

/// Predicado de visibilidade com filtros adicionais combinados por AND
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub class: EntityClass,
    pub scope: Scope,
    pub id: Option<Uuid>,
    pub patient: Option<Uuid>,
    pub status: Option<String>,
}

/// Calcula o predicado de visibilidade de `principal` sobre `class`
///
/// Terapeutas veem apenas o que possuem; supervisores veem tudo; qualquer
/// outro papel não vê nada.
pub fn compute_filter(principal: &Principal, class: EntityClass) -> RecordFilter {
    let scope = match principal {
        Principal::Therapist(id) => Scope::OwnedBy(*id),
        Principal::Supervisor(_) => Scope::Everything,
        Principal::Restricted(_) => Scope::Nothing,
    };
    RecordFilter {
        class,
        scope,
        id: None,
        patient: None,
        status: None,
    }
}

impl RecordFilter {
    /// Predicado sem restrição de propriedade, para verificações de integridade
    /// que independem de quem faz a requisição
    pub fn all(class: EntityClass) -> Self {
        Self {
            class,
            scope: Scope::Everything,
            id: None,
            patient: None,
            status: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_patient(mut self, patient: Option<Uuid>) -> Self {
        self.patient = patient;
        self
    }

    pub fn with_status(mut self, status: Option<String>) -> Self {
        self.status = status;
        self
    }

    /// Indica se o predicado nunca casa com nenhum registro
    pub fn is_empty_match(&self) -> bool {
        self.scope == Scope::Nothing
    }
}
