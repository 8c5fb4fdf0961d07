//! Read-only view over the knowledge graph.
//!
//! Points reference each other by id only. `parent_id` is the prerequisite
//! edge, `related_ids` a symmetric "see also" relation.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::models::KnowledgePoint;

#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    points: HashMap<String, KnowledgePoint>,
    children: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeTree {
    pub point: KnowledgePoint,
    pub children: Vec<KnowledgeTree>,
}

impl KnowledgeTree {
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(KnowledgeTree::size).sum::<usize>()
    }
}

impl KnowledgeGraph {
    pub fn new(points: Vec<KnowledgePoint>) -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for point in points.iter() {
            if let Some(parent_id) = point.parent_id.as_ref() {
                children
                    .entry(parent_id.clone())
                    .or_default()
                    .push(point.id.clone());
            }
        }

        let points: HashMap<String, KnowledgePoint> = points
            .into_iter()
            .map(|point| (point.id.clone(), point))
            .collect();

        for ids in children.values_mut() {
            ids.sort_by(|a, b| {
                let left = points.get(a).map(|p| p.difficulty).unwrap_or(u8::MAX);
                let right = points.get(b).map(|p| p.difficulty).unwrap_or(u8::MAX);
                left.cmp(&right).then_with(|| a.cmp(b))
            });
        }

        Self { points, children }
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgePoint> {
        self.points.get(id)
    }

    pub fn get_node(&self, id: &str) -> Result<&KnowledgePoint> {
        self.points
            .get(id)
            .ok_or_else(|| EngineError::KnowledgePointNotFound(id.to_string()))
    }

    /// Points in a subject (and optionally a grade), ordered by difficulty then id.
    pub fn points_in(&self, subject: Option<&str>, grade: Option<&str>) -> Vec<&KnowledgePoint> {
        let mut selected: Vec<&KnowledgePoint> = self
            .points
            .values()
            .filter(|point| subject.map_or(true, |s| point.subject == s))
            .filter(|point| grade.map_or(true, |g| point.grade == g))
            .collect();
        selected.sort_by(|a, b| a.difficulty.cmp(&b.difficulty).then_with(|| a.id.cmp(&b.id)));
        selected
    }

    /// Ancestors of `id`, ordered from the root down to its direct parent.
    ///
    /// A parent id that does not resolve ends the chain. A loop in the parent
    /// pointers is reported as a data error.
    pub fn prerequisite_chain(&self, id: &str) -> Result<Vec<&KnowledgePoint>> {
        let mut current = self.get_node(id)?;
        let mut seen: HashSet<&str> = HashSet::from([current.id.as_str()]);
        let mut chain = Vec::new();

        while let Some(parent_id) = current.parent_id.as_deref() {
            let Some(parent) = self.points.get(parent_id) else {
                break;
            };
            if !seen.insert(parent.id.as_str()) {
                let mut cycle: Vec<String> = seen.into_iter().map(str::to_string).collect();
                cycle.sort();
                return Err(EngineError::CyclicDependency(cycle));
            }
            chain.push(parent);
            current = parent;
        }

        chain.reverse();
        Ok(chain)
    }

    pub fn children(&self, id: &str) -> Vec<&KnowledgePoint> {
        self.children
            .get(id)
            .map(|ids| ids.iter().filter_map(|child| self.points.get(child)).collect())
            .unwrap_or_default()
    }

    /// Tree of every point whose prerequisite chain passes through `id`.
    pub fn descendants(&self, id: &str) -> Result<KnowledgeTree> {
        let root = self.get_node(id)?;
        let mut visited = HashSet::from([root.id.clone()]);
        Ok(self.build_tree(root, &mut visited))
    }

    fn build_tree(&self, point: &KnowledgePoint, visited: &mut HashSet<String>) -> KnowledgeTree {
        let mut children = Vec::new();
        for child in self.children(&point.id) {
            if visited.insert(child.id.clone()) {
                children.push(self.build_tree(child, visited));
            }
        }
        KnowledgeTree {
            point: point.clone(),
            children,
        }
    }

    /// Points linked to `id` through `related_ids` in either direction.
    pub fn related(&self, id: &str) -> Result<Vec<&KnowledgePoint>> {
        let point = self.get_node(id)?;
        let mut ids: HashSet<&str> = point.related_ids.iter().map(String::as_str).collect();
        for other in self.points.values() {
            if other.related_ids.iter().any(|related| related == id) {
                ids.insert(other.id.as_str());
            }
        }
        ids.remove(id);

        let mut related: Vec<&KnowledgePoint> =
            ids.into_iter().filter_map(|id| self.points.get(id)).collect();
        related.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(related)
    }

    /// Case-insensitive match on name, description or tags, easiest first.
    pub fn search(
        &self,
        keyword: &str,
        subject: Option<&str>,
        grade: Option<&str>,
    ) -> Vec<&KnowledgePoint> {
        let needle = keyword.trim().to_lowercase();
        let mut matches: Vec<&KnowledgePoint> = self
            .points_in(subject, grade)
            .into_iter()
            .filter(|point| {
                needle.is_empty()
                    || point.name.to_lowercase().contains(&needle)
                    || point.description.to_lowercase().contains(&needle)
                    || point.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
            })
            .collect();
        matches.sort_by(|a, b| {
            a.difficulty
                .cmp(&b.difficulty)
                .then_with(|| a.name.cmp(&b.name))
        });
        matches
    }

    /// True when every ancestor of `id` satisfies `mastered`.
    pub fn prerequisites_satisfied<F>(&self, id: &str, mastered: F) -> Result<bool>
    where
        F: Fn(&str) -> bool,
    {
        Ok(self
            .prerequisite_chain(id)?
            .iter()
            .all(|ancestor| mastered(ancestor.id.as_str())))
    }
}
