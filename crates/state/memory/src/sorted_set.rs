use std::collections::{BTreeSet, HashMap};

/// Members ordered ascending by `(score, member)`.
#[derive(Debug, Clone, Default)]
pub(crate) struct SortedSet {
    scores: HashMap<String, i64>,
    order: BTreeSet<(i64, String)>,
}

impl SortedSet {
    /// Insert or re-score `member`. Returns `true` if it was not present.
    pub(crate) fn insert(&mut self, member: &str, score: i64) -> bool {
        match self.scores.insert(member.to_owned(), score) {
            Some(previous) => {
                self.order.remove(&(previous, member.to_owned()));
                self.order.insert((score, member.to_owned()));
                false
            }
            None => {
                self.order.insert((score, member.to_owned()));
                true
            }
        }
    }

    pub(crate) fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&(score, member.to_owned()));
                true
            }
            None => false,
        }
    }

    pub(crate) fn rank(&self, member: &str) -> Option<usize> {
        let score = *self.scores.get(member)?;
        Some(self.order.range(..(score, member.to_owned())).count())
    }

    /// Remove every member scored `<= max`, returning how many were removed.
    pub(crate) fn remove_by_score(&mut self, max: i64) -> usize {
        let expired: Vec<(i64, String)> = self
            .order
            .iter()
            .take_while(|(score, _)| *score <= max)
            .cloned()
            .collect();
        for (score, member) in &expired {
            self.order.remove(&(*score, member.clone()));
            self.scores.remove(member);
        }
        expired.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.scores.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Members common to every set, each scored by its smallest score.
    pub(crate) fn intersect_min(sets: &[Option<&SortedSet>]) -> SortedSet {
        let mut result = SortedSet::default();
        let Some(Some(first)) = sets.first() else {
            return result;
        };
        'members: for (member, &score) in &first.scores {
            let mut min = score;
            for set in &sets[1..] {
                match set.and_then(|s| s.scores.get(member)) {
                    Some(&other) => min = min.min(other),
                    None => continue 'members,
                }
            }
            result.insert(member, min);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_new_members_only() {
        let mut set = SortedSet::default();
        assert!(set.insert("a", 1));
        assert!(!set.insert("a", 5));
        assert_eq!(set.len(), 1);
        assert_eq!(set.rank("a"), Some(0));
    }

    #[test]
    fn rescoring_moves_member() {
        let mut set = SortedSet::default();
        set.insert("a", 1);
        set.insert("b", 2);
        set.insert("a", 3);
        assert_eq!(set.rank("b"), Some(0));
        assert_eq!(set.rank("a"), Some(1));
    }

    #[test]
    fn equal_scores_break_ties_by_member() {
        let mut set = SortedSet::default();
        set.insert("b", 7);
        set.insert("a", 7);
        assert_eq!(set.rank("a"), Some(0));
        assert_eq!(set.rank("b"), Some(1));
    }

    #[test]
    fn remove_by_score_keeps_newer_members() {
        let mut set = SortedSet::default();
        set.insert("old", 10);
        set.insert("edge", 20);
        set.insert("new", 30);
        assert_eq!(set.remove_by_score(20), 2);
        assert_eq!(set.rank("new"), Some(0));
        assert_eq!(set.rank("old"), None);
    }

    #[test]
    fn intersect_with_missing_set_is_empty() {
        let mut set = SortedSet::default();
        set.insert("a", 1);
        assert!(SortedSet::intersect_min(&[Some(&set), None]).is_empty());
        assert!(SortedSet::intersect_min(&[]).is_empty());
    }

    #[test]
    fn intersect_takes_minimum_score() {
        let mut left = SortedSet::default();
        left.insert("a", 100);
        left.insert("b", 1);
        let mut right = SortedSet::default();
        right.insert("a", 5);
        right.insert("c", 1);
        let result = SortedSet::intersect_min(&[Some(&left), Some(&right)]);
        assert_eq!(result.len(), 1);
        assert_eq!(result.scores.get("a"), Some(&5));
    }
}
