use color_eyre::Result;
use std::collections::VecDeque;
use std::future::Future;

use super::action::{Action, Change};

/// Applies changes to the application's state.
///
/// Implemented by business logic; the history only decides which change to
/// apply.
pub trait ActionApplier {
  fn apply(&mut self, change: &Change) -> impl Future<Output = Result<()>> + Send;
}

pub const DEFAULT_CAPACITY: usize = 50;

/// Linear undo/redo log.
///
/// `applied` counts the entries whose effect is currently in place; entries
/// after it form the redo branch.
#[derive(Debug, Clone)]
pub struct ActionHistory {
  entries: VecDeque<Action>,
  applied: usize,
  capacity: usize,
}

impl Default for ActionHistory {
  fn default() -> Self {
    Self::new(DEFAULT_CAPACITY)
  }
}

impl ActionHistory {
  pub fn new(capacity: usize) -> Self {
    Self {
      entries: VecDeque::new(),
      applied: 0,
      capacity: capacity.max(1),
    }
  }

  /// Append an action whose effect has already happened.
  ///
  /// Anything that could have been redone is discarded. The oldest entry is
  /// evicted once the history is over capacity.
  pub fn record(&mut self, action: Action) {
    if self.applied < self.entries.len() {
      let discarded = self.entries.len() - self.applied;
      self.entries.truncate(self.applied);
      tracing::debug!(discarded, "discarded redo branch");
    }

    self.entries.push_back(action);
    self.applied = self.entries.len();

    while self.entries.len() > self.capacity {
      self.entries.pop_front();
      self.applied -= 1;
    }
  }

  /// Revert the most recent applied action.
  ///
  /// Returns `Ok(false)` when there is nothing to undo. The cursor only moves
  /// once the applier has finished; if it fails the history is unchanged.
  pub async fn undo<A: ActionApplier>(&mut self, applier: &mut A) -> Result<bool> {
    if self.applied == 0 {
      return Ok(false);
    }

    let action = &self.entries[self.applied - 1];
    applier.apply(&action.change.invert()).await?;
    tracing::debug!(id = %action.id, kind = ?action.kind(), "undid action");

    self.applied -= 1;
    Ok(true)
  }

  /// Re-apply the next undone action.
  ///
  /// Returns `Ok(false)` when there is nothing to redo.
  pub async fn redo<A: ActionApplier>(&mut self, applier: &mut A) -> Result<bool> {
    if self.applied == self.entries.len() {
      return Ok(false);
    }

    let action = &self.entries[self.applied];
    applier.apply(&action.change).await?;
    tracing::debug!(id = %action.id, kind = ?action.kind(), "redid action");

    self.applied += 1;
    Ok(true)
  }

  pub fn can_undo(&self) -> bool {
    self.applied > 0
  }

  pub fn can_redo(&self) -> bool {
    self.applied < self.entries.len()
  }

  /// The action `undo` would revert.
  pub fn peek_undo(&self) -> Option<&Action> {
    self.applied.checked_sub(1).and_then(|i| self.entries.get(i))
  }

  /// The action `redo` would re-apply.
  pub fn peek_redo(&self) -> Option<&Action> {
    self.entries.get(self.applied)
  }

  pub fn entries(&self) -> impl Iterator<Item = &Action> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.applied = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use serde_json::{json, Value};
  use std::collections::HashMap;

  /// Entity map the changes are applied to.
  #[derive(Default)]
  struct Records {
    rows: HashMap<String, Value>,
    applied: Vec<Change>,
    fail_next: bool,
  }

  impl Records {
    fn execute(&mut self, change: &Change) {
      match change {
        Change::Create { entity, after } => {
          self.rows.insert(entity.clone(), after.clone());
        }
        Change::Update { entity, after, .. } => {
          self.rows.insert(entity.clone(), after.clone());
        }
        Change::Delete { entity, .. } => {
          self.rows.remove(entity);
        }
        Change::Toggle {
          entity,
          field,
          before,
        } => {
          if let Some(Value::Object(row)) = self.rows.get_mut(entity) {
            row.insert(field.clone(), Value::Bool(!before));
          }
        }
        Change::Bulk { changes } => {
          for change in changes {
            self.execute(change);
          }
        }
      }
    }

    /// Perform a change as the UI would, then record it.
    fn perform(&mut self, history: &mut ActionHistory, id: &str, change: Change) {
      self.execute(&change);
      history.record(Action::new(id, id, change));
    }
  }

  impl ActionApplier for Records {
    async fn apply(&mut self, change: &Change) -> Result<()> {
      tokio::task::yield_now().await;
      if self.fail_next {
        self.fail_next = false;
        return Err(eyre!("backend rejected change"));
      }
      self.execute(change);
      self.applied.push(change.clone());
      Ok(())
    }
  }

  fn create(entity: &str, value: Value) -> Change {
    Change::Create {
      entity: entity.into(),
      after: value,
    }
  }

  #[tokio::test]
  async fn test_undo_restores_previous_state() {
    let mut history = ActionHistory::default();
    let mut records = Records::default();

    records.perform(&mut history, "A", create("a", json!(1)));
    records.perform(&mut history, "B", create("b", json!(2)));

    assert!(history.undo(&mut records).await.unwrap());
    assert!(records.rows.contains_key("a"));
    assert!(!records.rows.contains_key("b"));
    assert!(history.can_redo());
    assert!(history.can_undo());

    assert!(history.redo(&mut records).await.unwrap());
    assert_eq!(records.rows.get("b"), Some(&json!(2)));
    assert!(!history.can_redo());
  }

  #[tokio::test]
  async fn test_recording_after_undo_discards_redo_branch() {
    let mut history = ActionHistory::default();
    let mut records = Records::default();

    records.perform(&mut history, "A", create("a", json!(1)));
    records.perform(&mut history, "B", create("b", json!(2)));
    history.undo(&mut records).await.unwrap();

    records.perform(&mut history, "C", create("c", json!(3)));
    assert!(!history.can_redo());
    assert_eq!(history.len(), 2);

    let ids: Vec<&str> = history.entries().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "C"]);
    assert!(!history.redo(&mut records).await.unwrap());
  }

  #[tokio::test]
  async fn test_undo_and_redo_at_bounds_are_noops() {
    let mut history = ActionHistory::default();
    let mut records = Records::default();

    assert!(!history.can_undo());
    assert!(!history.can_redo());
    assert!(!history.undo(&mut records).await.unwrap());
    assert!(!history.redo(&mut records).await.unwrap());
    assert!(records.applied.is_empty());

    records.perform(&mut history, "A", create("a", json!(1)));
    assert!(history.undo(&mut records).await.unwrap());
    assert!(!history.undo(&mut records).await.unwrap());
    assert!(!history.can_undo());
  }

  #[tokio::test]
  async fn test_capacity_evicts_oldest_and_keeps_position() {
    let mut history = ActionHistory::new(3);
    let mut records = Records::default();

    for i in 0..5 {
      records.perform(&mut history, &format!("A{}", i), create(&format!("e{}", i), json!(i)));
    }
    assert_eq!(history.len(), 3);
    let ids: Vec<&str> = history.entries().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["A2", "A3", "A4"]);

    // Only three undos are possible
    for _ in 0..3 {
      assert!(history.undo(&mut records).await.unwrap());
    }
    assert!(!history.undo(&mut records).await.unwrap());
    assert!(records.rows.contains_key("e1"));
    assert!(!records.rows.contains_key("e2"));
  }

  #[tokio::test]
  async fn test_history_never_exceeds_default_cap() {
    let mut history = ActionHistory::default();
    let mut records = Records::default();
    for i in 0..120 {
      records.perform(&mut history, &i.to_string(), create(&i.to_string(), json!(i)));
      assert!(history.len() <= DEFAULT_CAPACITY);
    }
    assert_eq!(history.len(), DEFAULT_CAPACITY);
    assert_eq!(history.peek_undo().unwrap().id, "119");
  }

  #[tokio::test]
  async fn test_eviction_after_undo_preserves_relative_position() {
    let mut history = ActionHistory::new(2);
    let mut records = Records::default();

    records.perform(&mut history, "A", create("a", json!(1)));
    records.perform(&mut history, "B", create("b", json!(2)));
    history.undo(&mut records).await.unwrap();
    records.perform(&mut history, "C", create("c", json!(3)));
    records.perform(&mut history, "D", create("d", json!(4)));

    let ids: Vec<&str> = history.entries().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["C", "D"]);
    assert_eq!(history.peek_undo().unwrap().id, "D");
    assert!(history.peek_redo().is_none());
  }

  #[tokio::test]
  async fn test_failed_effect_leaves_cursor_unchanged() {
    let mut history = ActionHistory::default();
    let mut records = Records::default();
    records.perform(&mut history, "A", create("a", json!(1)));

    records.fail_next = true;
    assert!(history.undo(&mut records).await.is_err());
    assert!(history.can_undo());
    assert!(!history.can_redo());
    assert!(records.rows.contains_key("a"));

    assert!(history.undo(&mut records).await.unwrap());
    assert!(!records.rows.contains_key("a"));
  }

  #[tokio::test]
  async fn test_bulk_delete_undo_restores_all_rows() {
    let mut history = ActionHistory::default();
    let mut records = Records::default();
    records.rows.insert("c-1".into(), json!({"status": "active"}));
    records.rows.insert("c-2".into(), json!({"status": "active"}));

    records.perform(
      &mut history,
      "bulk-delete",
      Change::Bulk {
        changes: vec![
          Change::Delete {
            entity: "c-1".into(),
            before: json!({"status": "active"}),
          },
          Change::Delete {
            entity: "c-2".into(),
            before: json!({"status": "active"}),
          },
        ],
      },
    );
    assert!(records.rows.is_empty());

    history.undo(&mut records).await.unwrap();
    assert_eq!(records.rows.len(), 2);
  }

  #[tokio::test]
  async fn test_toggle_roundtrip() {
    let mut history = ActionHistory::default();
    let mut records = Records::default();
    records.rows.insert("rule:1".into(), json!({"enabled": true}));

    records.perform(
      &mut history,
      "disable",
      Change::Toggle {
        entity: "rule:1".into(),
        field: "enabled".into(),
        before: true,
      },
    );
    assert_eq!(records.rows["rule:1"]["enabled"], false);

    history.undo(&mut records).await.unwrap();
    assert_eq!(records.rows["rule:1"]["enabled"], true);

    history.redo(&mut records).await.unwrap();
    assert_eq!(records.rows["rule:1"]["enabled"], false);
  }

  #[test]
  fn test_clear_and_peek() {
    let mut history = ActionHistory::default();
    history.record(Action::new("A", "Create a", create("a", json!(1))));
    assert_eq!(history.peek_undo().map(|a| a.description.as_str()), Some("Create a"));
    assert!(history.peek_redo().is_none());

    history.clear();
    assert!(history.is_empty());
    assert!(!history.can_undo());
  }
}
