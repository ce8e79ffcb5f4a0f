//! Recomposition (circuit knitting).
//!
//! Jobs that run concurrently on one machine are merged into a single
//! [`CombinedExecutionUnit`]. Each member records its logical position (qubit
//! offset and width) inside the unit so that the combined execution result can
//! be split back per member by [`disaggregate`].

use std::collections::BTreeMap;

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assignment::{Assignment, AssignmentEntry};
use crate::error::{CoreError, CoreResult};
use crate::job::{JobId, MachineId, Time};

/// Which co-scheduled jobs are merged into one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Merge only jobs with identical `[start, end)` windows.
    #[default]
    ExactWindow,
    /// Merge connected components of the overlap graph.
    AnyOverlap,
}

/// Position of one member job inside a combined unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitMember {
    /// The member job.
    pub job: JobId,
    /// First logical qubit of the member inside the unit.
    pub offset: u32,
    /// Number of logical qubits the member occupies.
    pub width: u32,
    /// Planned start of the member.
    pub start: Time,
    /// Planned end of the member.
    pub end: Time,
}

impl UnitMember {
    /// Planned duration of the member.
    pub fn duration(&self) -> Time {
        self.end - self.start
    }
}

/// A group of jobs executed as one unit of work on one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedExecutionUnit {
    /// Deterministic unit id, `{machine}#{index}`.
    pub id: String,
    /// Machine that runs the unit.
    pub machine: MachineId,
    /// Earliest member start.
    pub start: Time,
    /// Latest member end.
    pub end: Time,
    /// Members in layout order.
    pub members: Vec<UnitMember>,
}

impl CombinedExecutionUnit {
    /// Total logical width of the merged unit.
    pub fn width(&self) -> u32 {
        self.members.iter().map(|m| m.width).sum()
    }

    /// Whether the unit merges more than one job.
    pub fn is_merged(&self) -> bool {
        self.members.len() > 1
    }

    /// Member job ids in layout order.
    pub fn job_ids(&self) -> impl Iterator<Item = &JobId> {
        self.members.iter().map(|m| &m.job)
    }
}

/// Output of executing one unit (or one job).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Quality score in `[0, 1]`, e.g. fidelity.
    pub result_quality: f64,

    /// Measured bitstring counts over the unit's full width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<BTreeMap<String, u64>>,

    /// Wall time the unit actually took, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<Time>,
}

impl ExecutionResult {
    /// A result carrying only a quality score.
    pub fn with_quality(result_quality: f64) -> Self {
        Self {
            result_quality,
            ..Default::default()
        }
    }

    /// Attach measured counts.
    pub fn with_counts(mut self, counts: BTreeMap<String, u64>) -> Self {
        self.counts = Some(counts);
        self
    }

    /// Attach the measured duration.
    pub fn with_actual_duration(mut self, duration: Time) -> Self {
        self.actual_duration = Some(duration);
        self
    }
}

/// Builds combined execution units from an assignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recomposer {
    policy: MergePolicy,
}

impl Recomposer {
    /// Create a recomposer with the given merge policy.
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// The active merge policy.
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Group co-scheduled jobs per machine into execution units.
    ///
    /// Units come out ordered by machine id, then start time. Every
    /// assignment entry lands in exactly one unit.
    pub fn group_concurrent(
        &self,
        assignment: &Assignment,
    ) -> CoreResult<Vec<CombinedExecutionUnit>> {
        let by_machine = assignment.by_machine();
        let mut machines: Vec<&MachineId> = by_machine.keys().collect();
        machines.sort();

        let mut units = Vec::new();
        for machine in machines {
            let entries = &by_machine[machine];
            let groups = match self.policy {
                MergePolicy::ExactWindow => exact_window_groups(entries),
                MergePolicy::AnyOverlap => overlap_components(entries),
            };
            for (index, group) in groups.into_iter().enumerate() {
                units.push(build_unit(machine, index, &group)?);
            }
        }

        debug!(
            "Grouped {} job(s) into {} unit(s) ({:?})",
            assignment.len(),
            units.len(),
            self.policy
        );
        Ok(units)
    }
}

fn exact_window_groups<'a>(entries: &[&'a AssignmentEntry]) -> Vec<Vec<&'a AssignmentEntry>> {
    let mut groups: Vec<Vec<&'a AssignmentEntry>> = Vec::new();
    for &entry in entries {
        let existing = groups
            .iter_mut()
            .find(|g| g[0].start == entry.start && g[0].end == entry.end);
        match existing {
            Some(group) => group.push(entry),
            None => groups.push(vec![entry]),
        }
    }
    groups
}

fn overlap_components<'a>(entries: &[&'a AssignmentEntry]) -> Vec<Vec<&'a AssignmentEntry>> {
    let mut components = UnionFind::<usize>::new(entries.len());
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            if entries[i].overlaps(entries[j]) {
                components.union(i, j);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<&'a AssignmentEntry>> = BTreeMap::new();
    for (i, &entry) in entries.iter().enumerate() {
        groups.entry(components.find(i)).or_default().push(entry);
    }

    // Order components by their first member so unit indices follow time.
    let mut groups: Vec<Vec<&'a AssignmentEntry>> = groups.into_values().collect();
    groups.sort_by(|a, b| {
        a[0].start
            .total_cmp(&b[0].start)
            .then_with(|| a[0].job.cmp(&b[0].job))
    });
    groups
}

fn build_unit(
    machine: &MachineId,
    index: usize,
    group: &[&AssignmentEntry],
) -> CoreResult<CombinedExecutionUnit> {
    let (Some(start), Some(end)) = (
        group.iter().map(|e| e.start).reduce(f64::min),
        group.iter().map(|e| e.end).reduce(f64::max),
    ) else {
        return Err(CoreError::Internal(format!(
            "empty execution unit on {machine}"
        )));
    };

    let mut offset = 0;
    let members = group
        .iter()
        .map(|entry| {
            let member = UnitMember {
                job: entry.job.clone(),
                offset,
                width: entry.requirement,
                start: entry.start,
                end: entry.end,
            };
            offset += entry.requirement;
            member
        })
        .collect();

    Ok(CombinedExecutionUnit {
        id: format!("{machine}#{index}"),
        machine: machine.clone(),
        start,
        end,
        members,
    })
}

/// Split a unit's execution result back onto its members.
///
/// Quality is propagated uniformly. When the result carries counts, each
/// member receives the marginal distribution over its own bits. Bitstrings
/// are little-endian: logical qubit 0 is the rightmost character.
///
/// A measured duration is spread over the members in proportion to their
/// planned durations: a member receives `planned * actual / unit_span`.
pub fn disaggregate(
    unit: &CombinedExecutionUnit,
    result: &ExecutionResult,
) -> CoreResult<BTreeMap<JobId, ExecutionResult>> {
    if unit.members.is_empty() {
        return Err(CoreError::Internal(format!(
            "execution unit {} has no members",
            unit.id
        )));
    }

    let span = unit.end - unit.start;
    let mut per_job = BTreeMap::new();
    for member in &unit.members {
        let actual_duration = result.actual_duration.map(|actual| {
            if span > 0.0 {
                member.duration() * actual / span
            } else {
                actual
            }
        });
        let counts = match &result.counts {
            Some(counts) => Some(marginalize(counts, member, unit.width())?),
            None => None,
        };
        per_job.insert(
            member.job.clone(),
            ExecutionResult {
                result_quality: result.result_quality,
                counts,
                actual_duration,
            },
        );
    }
    Ok(per_job)
}

fn marginalize(
    counts: &BTreeMap<String, u64>,
    member: &UnitMember,
    total_width: u32,
) -> CoreResult<BTreeMap<String, u64>> {
    let mut marginal = BTreeMap::new();
    for (bits, count) in counts {
        let bits: String = bits.chars().filter(|c| !c.is_whitespace()).collect();
        if !bits.is_ascii() || bits.len() != total_width as usize {
            return Err(CoreError::Internal(format!(
                "bitstring '{bits}' does not match unit width {total_width}"
            )));
        }
        let hi = bits.len() - member.offset as usize;
        let lo = hi - member.width as usize;
        *marginal.entry(bits[lo..hi].to_string()).or_insert(0) += count;
    }
    Ok(marginal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;

    fn entry(id: &str, req: u32, machine: &str, start: Time, end: Time) -> AssignmentEntry {
        AssignmentEntry::new(&Job::new(id, req).unwrap(), machine, start, end)
    }

    fn member(id: &str, offset: u32, width: u32) -> UnitMember {
        UnitMember {
            job: JobId::new(id),
            offset,
            width,
            start: 0.0,
            end: 2.0,
        }
    }

    #[test]
    fn test_exact_window_merges_identical_slots() {
        let mut assignment = Assignment::new("test");
        assignment.push(entry("1_1", 2, "M1", 0.0, 4.0));
        assignment.push(entry("1_2", 2, "M1", 0.0, 4.0));
        assignment.push(entry("1_3", 1, "M1", 0.0, 4.0));

        let units = Recomposer::default().group_concurrent(&assignment).unwrap();
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert_eq!(unit.members.len(), 3);
        assert_eq!(unit.width(), 5);
        assert_eq!(unit.members[2].offset, 4);

        let results = disaggregate(unit, &ExecutionResult::with_quality(0.9)).unwrap();
        assert_eq!(results.len(), 3);
        for id in ["1_1", "1_2", "1_3"] {
            assert_eq!(results[&JobId::new(id)].result_quality, 0.9);
        }
    }

    #[test]
    fn test_exact_window_keeps_partial_overlap_apart() {
        let mut assignment = Assignment::new("test");
        assignment.push(entry("a", 2, "M1", 0.0, 4.0));
        assignment.push(entry("b", 2, "M1", 2.0, 6.0));
        assignment.push(entry("c", 2, "M2", 0.0, 4.0));

        let units = Recomposer::new(MergePolicy::ExactWindow)
            .group_concurrent(&assignment)
            .unwrap();
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| !u.is_merged()));
        assert_eq!(units[0].id, "M1#0");
        assert_eq!(units[2].machine, MachineId::new("M2"));
    }

    #[test]
    fn test_any_overlap_uses_transitive_components() {
        // a overlaps b, b overlaps c, a and c are disjoint.
        let mut assignment = Assignment::new("test");
        assignment.push(entry("a", 1, "M1", 0.0, 2.0));
        assignment.push(entry("b", 1, "M1", 1.0, 4.0));
        assignment.push(entry("c", 1, "M1", 3.0, 5.0));
        assignment.push(entry("d", 1, "M1", 6.0, 7.0));

        let units = Recomposer::new(MergePolicy::AnyOverlap)
            .group_concurrent(&assignment)
            .unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].members.len(), 3);
        assert_eq!((units[0].start, units[0].end), (0.0, 5.0));
        assert_eq!(units[1].job_ids().collect::<Vec<_>>(), vec![&JobId::new("d")]);
    }

    #[test]
    fn test_disaggregate_scales_duration_per_member() {
        let mut assignment = Assignment::new("test");
        assignment.push(entry("a", 3, "M1", 0.0, 3.0));
        assignment.push(entry("b", 1, "M1", 0.0, 1.0));

        let units = Recomposer::new(MergePolicy::AnyOverlap)
            .group_concurrent(&assignment)
            .unwrap();
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert_eq!(unit.members[1].duration(), 1.0);

        // Ran exactly as planned.
        let per_job =
            disaggregate(unit, &ExecutionResult::with_quality(1.0).with_actual_duration(3.0))
                .unwrap();
        assert_eq!(per_job[&JobId::new("a")].actual_duration, Some(3.0));
        assert_eq!(per_job[&JobId::new("b")].actual_duration, Some(1.0));

        // Ran twice as long.
        let per_job =
            disaggregate(unit, &ExecutionResult::with_quality(1.0).with_actual_duration(6.0))
                .unwrap();
        assert_eq!(per_job[&JobId::new("a")].actual_duration, Some(6.0));
        assert_eq!(per_job[&JobId::new("b")].actual_duration, Some(2.0));
    }

    #[test]
    fn test_disaggregate_marginalizes_counts() {
        let unit = CombinedExecutionUnit {
            id: "M1#0".to_string(),
            machine: MachineId::new("M1"),
            start: 0.0,
            end: 2.0,
            members: vec![member("a", 0, 2), member("b", 2, 1)],
        };
        let counts = BTreeMap::from([
            ("0 11".to_string(), 30),
            ("100".to_string(), 50),
            ("111".to_string(), 20),
        ]);
        let result = ExecutionResult::with_quality(0.75).with_counts(counts);

        let per_job = disaggregate(&unit, &result).unwrap();
        let a = per_job[&JobId::new("a")].counts.as_ref().unwrap();
        let b = per_job[&JobId::new("b")].counts.as_ref().unwrap();
        assert_eq!(a, &BTreeMap::from([("00".to_string(), 50), ("11".to_string(), 50)]));
        assert_eq!(b, &BTreeMap::from([("0".to_string(), 30), ("1".to_string(), 70)]));
        assert_eq!(per_job[&JobId::new("b")].result_quality, 0.75);
    }

    #[test]
    fn test_disaggregate_rejects_empty_unit() {
        let unit = CombinedExecutionUnit {
            id: "M1#0".to_string(),
            machine: MachineId::new("M1"),
            start: 0.0,
            end: 1.0,
            members: Vec::new(),
        };
        let err = disaggregate(&unit, &ExecutionResult::with_quality(1.0)).unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
    }

    #[test]
    fn test_disaggregate_rejects_bad_width() {
        let unit = CombinedExecutionUnit {
            id: "M1#0".to_string(),
            machine: MachineId::new("M1"),
            start: 0.0,
            end: 1.0,
            members: vec![member("a", 0, 2)],
        };
        let result = ExecutionResult::with_quality(1.0)
            .with_counts(BTreeMap::from([("101".to_string(), 1)]));
        assert!(disaggregate(&unit, &result).is_err());
    }
}
