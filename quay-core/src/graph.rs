//! Job dependency graph
//!
//! Validates a pipeline's jobs into a DAG and answers the scheduler's two
//! questions: which pending jobs may start now, and which can never start
//! because a predecessor did not succeed.

use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

use crate::domain::job::JobStatus;
use crate::domain::pipeline::JobSpec;

/// Invalid pipeline structure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("pipeline has no jobs")]
    Empty,

    #[error("job '{0}' is declared more than once")]
    DuplicateJob(String),

    #[error("job '{job}' needs unknown job '{needs}'")]
    UnknownDependency { job: String, needs: String },

    #[error("job '{0}' depends on itself")]
    SelfDependency(String),

    #[error("dependency cycle between jobs: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("artifact '{artifact}' is uploaded by both '{first}' and '{second}'")]
    DuplicateArtifact {
        artifact: String,
        first: String,
        second: String,
    },

    #[error("job '{job}' consumes artifact '{artifact}' which no upstream job produces")]
    MissingArtifact { job: String, artifact: String },
}

/// Validated, topologically ordered job graph
#[derive(Debug, Clone)]
pub struct JobGraph {
    jobs: Vec<JobSpec>,
    index: HashMap<String, usize>,
    predecessors: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl JobGraph {
    pub fn new(jobs: Vec<JobSpec>) -> Result<Self, GraphError> {
        if jobs.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut index = HashMap::with_capacity(jobs.len());
        for (i, job) in jobs.iter().enumerate() {
            if index.insert(job.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateJob(job.name.clone()));
            }
        }

        let mut predecessors = vec![Vec::new(); jobs.len()];
        let mut successors = vec![Vec::new(); jobs.len()];
        for (i, job) in jobs.iter().enumerate() {
            for needed in &job.needs {
                if needed == &job.name {
                    return Err(GraphError::SelfDependency(job.name.clone()));
                }
                let &p = index
                    .get(needed)
                    .ok_or_else(|| GraphError::UnknownDependency {
                        job: job.name.clone(),
                        needs: needed.clone(),
                    })?;
                if !predecessors[i].contains(&p) {
                    predecessors[i].push(p);
                    successors[p].push(i);
                }
            }
        }

        let order = topological_order(&jobs, &predecessors, &successors)?;

        let graph = Self {
            jobs,
            index,
            predecessors,
            order,
        };
        graph.check_artifacts()?;
        Ok(graph)
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    pub fn get(&self, name: &str) -> Option<&JobSpec> {
        self.index.get(name).map(|&i| &self.jobs[i])
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job names in dependency order; ties keep declaration order
    pub fn topological_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| self.jobs[i].name.as_str())
            .collect()
    }

    /// Pending jobs whose predecessors have all succeeded
    pub fn ready(&self, statuses: &HashMap<String, JobStatus>) -> Vec<&str> {
        self.pending(statuses)
            .filter(|&i| {
                self.predecessors[i]
                    .iter()
                    .all(|&p| self.status_of(statuses, p) == JobStatus::Succeeded)
            })
            .map(|i| self.jobs[i].name.as_str())
            .collect()
    }

    /// Pending jobs with a predecessor that failed, was skipped or was cancelled
    pub fn blocked(&self, statuses: &HashMap<String, JobStatus>) -> Vec<&str> {
        self.pending(statuses)
            .filter(|&i| {
                self.predecessors[i].iter().any(|&p| {
                    matches!(
                        self.status_of(statuses, p),
                        JobStatus::Failed | JobStatus::Skipped | JobStatus::Cancelled
                    )
                })
            })
            .map(|i| self.jobs[i].name.as_str())
            .collect()
    }

    fn pending<'a>(
        &'a self,
        statuses: &'a HashMap<String, JobStatus>,
    ) -> impl Iterator<Item = usize> + 'a {
        self.order
            .iter()
            .copied()
            .filter(move |&i| self.status_of(statuses, i) == JobStatus::Pending)
    }

    fn status_of(&self, statuses: &HashMap<String, JobStatus>, i: usize) -> JobStatus {
        statuses
            .get(&self.jobs[i].name)
            .copied()
            .unwrap_or(JobStatus::Pending)
    }

    fn ancestors(&self, i: usize) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<usize> = self.predecessors[i].iter().copied().collect();
        while let Some(p) = queue.pop_front() {
            if seen.insert(p) {
                queue.extend(self.predecessors[p].iter().copied());
            }
        }
        seen
    }

    fn check_artifacts(&self) -> Result<(), GraphError> {
        let mut producers: HashMap<&str, usize> = HashMap::new();
        for (i, job) in self.jobs.iter().enumerate() {
            if let Some(artifact) = job.action.produces() {
                if let Some(&first) = producers.get(artifact) {
                    return Err(GraphError::DuplicateArtifact {
                        artifact: artifact.to_string(),
                        first: self.jobs[first].name.clone(),
                        second: job.name.clone(),
                    });
                }
                producers.insert(artifact, i);
            }
        }

        for (i, job) in self.jobs.iter().enumerate() {
            let Some(artifact) = job.action.consumes() else {
                continue;
            };
            let upstream = producers
                .get(artifact)
                .is_some_and(|p| self.ancestors(i).contains(p));
            if !upstream {
                return Err(GraphError::MissingArtifact {
                    job: job.name.clone(),
                    artifact: artifact.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Kahn's algorithm, seeded and drained in declaration order
fn topological_order(
    jobs: &[JobSpec],
    predecessors: &[Vec<usize>],
    successors: &[Vec<usize>],
) -> Result<Vec<usize>, GraphError> {
    let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..jobs.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(jobs.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &s in &successors[i] {
            in_degree[s] -= 1;
            if in_degree[s] == 0 {
                queue.push_back(s);
            }
        }
    }

    if order.len() != jobs.len() {
        let cycle = (0..jobs.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| jobs[i].name.clone())
            .collect();
        return Err(GraphError::Cycle(cycle));
    }

    Ok(order)
}
