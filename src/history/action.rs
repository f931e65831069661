//! Recorded user actions as data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
  Create,
  Update,
  Delete,
  Toggle,
  Bulk,
}

/// A state change that can be applied and inverted.
///
/// `entity` identifies the affected record (e.g. `customer:c-17`); its
/// meaning belongs to whoever applies the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Change {
  Create {
    entity: String,
    after: Value,
  },
  Update {
    entity: String,
    before: Value,
    after: Value,
  },
  Delete {
    entity: String,
    before: Value,
  },
  Toggle {
    entity: String,
    field: String,
    before: bool,
  },
  Bulk {
    changes: Vec<Change>,
  },
}

impl Change {
  pub fn kind(&self) -> ActionKind {
    match self {
      Self::Create { .. } => ActionKind::Create,
      Self::Update { .. } => ActionKind::Update,
      Self::Delete { .. } => ActionKind::Delete,
      Self::Toggle { .. } => ActionKind::Toggle,
      Self::Bulk { .. } => ActionKind::Bulk,
    }
  }

  /// The change that undoes this one.
  pub fn invert(&self) -> Change {
    match self {
      Self::Create { entity, after } => Self::Delete {
        entity: entity.clone(),
        before: after.clone(),
      },
      Self::Delete { entity, before } => Self::Create {
        entity: entity.clone(),
        after: before.clone(),
      },
      Self::Update {
        entity,
        before,
        after,
      } => Self::Update {
        entity: entity.clone(),
        before: after.clone(),
        after: before.clone(),
      },
      Self::Toggle {
        entity,
        field,
        before,
      } => Self::Toggle {
        entity: entity.clone(),
        field: field.clone(),
        before: !before,
      },
      Self::Bulk { changes } => Self::Bulk {
        changes: changes.iter().rev().map(Change::invert).collect(),
      },
    }
  }
}

/// One entry in the action history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
  pub id: String,
  pub timestamp: DateTime<Utc>,
  /// Label for undo/redo buttons, e.g. "Delete 3 customers"
  pub description: String,
  pub change: Change,
}

impl Action {
  pub fn new(id: impl Into<String>, description: impl Into<String>, change: Change) -> Self {
    Self {
      id: id.into(),
      timestamp: Utc::now(),
      description: description.into(),
      change,
    }
  }

  pub fn kind(&self) -> ActionKind {
    self.change.kind()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_create_and_delete_invert_each_other() {
    let create = Change::Create {
      entity: "customer:c-1".into(),
      after: json!({"name": "Abebe"}),
    };
    let inverted = create.invert();
    assert_eq!(
      inverted,
      Change::Delete {
        entity: "customer:c-1".into(),
        before: json!({"name": "Abebe"}),
      }
    );
    assert_eq!(inverted.invert(), create);
  }

  #[test]
  fn test_update_swaps_states() {
    let update = Change::Update {
      entity: "rule:r-4".into(),
      before: json!({"threshold": 600}),
      after: json!({"threshold": 650}),
    };
    match update.invert() {
      Change::Update { before, after, .. } => {
        assert_eq!(before, json!({"threshold": 650}));
        assert_eq!(after, json!({"threshold": 600}));
      }
      other => panic!("unexpected inverse: {:?}", other),
    }
  }

  #[test]
  fn test_toggle_flips() {
    let toggle = Change::Toggle {
      entity: "rule:r-4".into(),
      field: "enabled".into(),
      before: true,
    };
    assert_eq!(toggle.invert().invert(), toggle);
    assert!(matches!(toggle.invert(), Change::Toggle { before: false, .. }));
  }

  #[test]
  fn test_bulk_inverts_in_reverse_order() {
    let bulk = Change::Bulk {
      changes: vec![
        Change::Delete {
          entity: "a".into(),
          before: json!(1),
        },
        Change::Delete {
          entity: "b".into(),
          before: json!(2),
        },
      ],
    };

    let Change::Bulk { changes } = bulk.invert() else {
      panic!("bulk inverse must be bulk");
    };
    assert_eq!(
      changes,
      vec![
        Change::Create {
          entity: "b".into(),
          after: json!(2),
        },
        Change::Create {
          entity: "a".into(),
          after: json!(1),
        },
      ]
    );
    assert_eq!(bulk.kind(), ActionKind::Bulk);
  }

  #[test]
  fn test_action_serializes_with_kind_tag() {
    let action = Action::new(
      "a-1",
      "Disable rule",
      Change::Toggle {
        entity: "rule:r-1".into(),
        field: "enabled".into(),
        before: true,
      },
    );
    let json = serde_json::to_value(&action).unwrap();
    assert_eq!(json["change"]["kind"], "toggle");
    assert_eq!(json["description"], "Disable rule");

    let back: Action = serde_json::from_value(json).unwrap();
    assert_eq!(back, action);
    assert_eq!(back.kind(), ActionKind::Toggle);
  }
}
