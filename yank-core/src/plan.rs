use crate::{errors::YankError, resume::ResumeRecords};

/// A contiguous byte range `[offset, limit)` owned by exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub id: u32,
    pub offset: u64,
    pub limit: u64,
}

impl Chunk {
    /// Number of bytes this chunk is expected to hold.
    pub fn expected_size(&self) -> u64 {
        self.limit - self.offset
    }

    pub fn is_satisfied(&self) -> bool {
        self.offset >= self.limit
    }

    /// Value of the `Range` header for this chunk. The end is inclusive on
    /// the wire, so the last requested byte is `limit - 1`.
    pub fn range_header(&self) -> String {
        format!(
            "bytes={start}-{end}",
            start = self.offset,
            end = self.limit - 1
        )
    }
}

/// The immutable split of a resource into `N` disjoint chunks.
///
/// Chunk ids are `0..N` and index directly into the plan. The union of the
/// ranges is exactly `[0, content_length)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    content_length: u64,
    chunks: Vec<Chunk>,
}

impl ChunkPlan {
    /// Splits `content_length` bytes into `concurrency` chunks of
    /// `content_length / concurrency` bytes; the last chunk absorbs the
    /// remainder.
    pub fn new(content_length: u64, concurrency: u32) -> Result<Self, YankError> {
        if content_length == 0 {
            return Err(YankError::Config(
                "content length must be greater than zero".to_string(),
            ));
        }
        if concurrency == 0 {
            return Err(YankError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if u64::from(concurrency) > content_length {
            return Err(YankError::Config(format!(
                "concurrency {} exceeds the resource size of {} bytes",
                concurrency, content_length
            )));
        }

        let chunk_size = content_length / u64::from(concurrency);
        let chunks = (0..concurrency)
            .map(|id| {
                let offset = u64::from(id) * chunk_size;
                Chunk {
                    id,
                    offset,
                    limit: if id + 1 == concurrency {
                        content_length
                    } else {
                        offset + chunk_size
                    },
                }
            })
            .collect();

        Ok(ChunkPlan {
            content_length,
            chunks,
        })
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Chunk> {
        self.chunks.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Work assignments for a resumed run: every chunk starts at its recorded
    /// absolute resume offset and keeps its original limit.
    ///
    /// Records that don't line up with this plan mean the remote resource (or
    /// the concurrency) changed since they were written.
    pub fn resume_from(&self, records: &ResumeRecords) -> Result<Vec<Chunk>, YankError> {
        self.chunks
            .iter()
            .map(|chunk| {
                let record = records.get(&chunk.id).ok_or_else(|| YankError::MarkerCorrupt {
                    chunk_id: chunk.id,
                    reason: "marker missing from resume set".to_string(),
                })?;
                if record.original_limit != chunk.limit {
                    return Err(YankError::MarkerCorrupt {
                        chunk_id: chunk.id,
                        reason: format!(
                            "recorded limit {} does not match planned limit {}",
                            record.original_limit, chunk.limit
                        ),
                    });
                }
                if record.resume_offset < chunk.offset || record.resume_offset > chunk.limit {
                    return Err(YankError::MarkerCorrupt {
                        chunk_id: chunk.id,
                        reason: format!(
                            "resume offset {} lies outside [{}, {}]",
                            record.resume_offset, chunk.offset, chunk.limit
                        ),
                    });
                }
                Ok(Chunk {
                    id: chunk.id,
                    offset: record.resume_offset,
                    limit: chunk.limit,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resume::{ResumeRecord, ResumeRecords};

    fn assert_covers(plan: &ChunkPlan, content_length: u64) {
        let mut next = 0;
        for (index, chunk) in plan.iter().enumerate() {
            assert_eq!(chunk.id as usize, index);
            assert_eq!(chunk.offset, next, "gap or overlap before chunk {}", chunk.id);
            assert!(chunk.limit > chunk.offset);
            next = chunk.limit;
        }
        assert_eq!(next, content_length);
    }

    #[test]
    fn test_plan_even_split() {
        let plan = ChunkPlan::new(1000, 4).unwrap();

        let ranges: Vec<(u64, u64)> = plan.iter().map(|c| (c.offset, c.limit)).collect();
        assert_eq!(ranges, vec![(0, 250), (250, 500), (500, 750), (750, 1000)]);
    }

    #[test]
    fn test_plan_last_chunk_absorbs_remainder() {
        let plan = ChunkPlan::new(1003, 4).unwrap();

        assert_eq!(plan.len(), 4);
        assert_eq!(plan.get(3).unwrap().offset, 750);
        assert_eq!(plan.get(3).unwrap().limit, 1003);
        assert_covers(&plan, 1003);
    }

    #[test]
    fn test_plan_covers_range_for_many_inputs() {
        for content_length in [1u64, 2, 7, 99, 100, 101, 4096, 141_748_419] {
            for concurrency in [1u32, 2, 3, 7, 16, 64] {
                if u64::from(concurrency) > content_length {
                    continue;
                }
                let plan = ChunkPlan::new(content_length, concurrency).unwrap();
                assert_eq!(plan.len(), concurrency as usize);
                assert_covers(&plan, content_length);
            }
        }
    }

    #[test]
    fn test_plan_one_byte_per_chunk() {
        let plan = ChunkPlan::new(5, 5).unwrap();

        assert!(plan.iter().all(|c| c.expected_size() == 1));
        assert_covers(&plan, 5);
    }

    #[test]
    fn test_plan_rejects_zero_concurrency() {
        assert!(matches!(ChunkPlan::new(1000, 0), Err(YankError::Config(_))));
    }

    #[test]
    fn test_plan_rejects_concurrency_above_length() {
        assert!(matches!(ChunkPlan::new(3, 4), Err(YankError::Config(_))));
    }

    #[test]
    fn test_range_header_is_inclusive() {
        let chunk = Chunk {
            id: 1,
            offset: 350,
            limit: 500,
        };

        assert_eq!(chunk.range_header(), "bytes=350-499");
    }

    #[test]
    fn test_resume_from_uses_absolute_offsets() {
        let plan = ChunkPlan::new(1000, 4).unwrap();
        let records: ResumeRecords = [(0, 250), (350, 500), (500, 750), (750, 1000)]
            .into_iter()
            .enumerate()
            .map(|(id, (resume_offset, original_limit))| {
                (
                    id as u32,
                    ResumeRecord {
                        resume_offset,
                        original_limit,
                    },
                )
            })
            .collect();

        let work = plan.resume_from(&records).unwrap();

        assert_eq!(work[0].offset, 0);
        assert_eq!(work[1].offset, 350);
        assert_eq!(work[1].limit, 500);
        assert_eq!(work[3].offset, 750);
    }

    #[test]
    fn test_resume_from_rejects_foreign_limits() {
        let plan = ChunkPlan::new(1000, 2).unwrap();
        let records: ResumeRecords = [
            (
                0,
                ResumeRecord {
                    resume_offset: 10,
                    original_limit: 400,
                },
            ),
            (
                1,
                ResumeRecord {
                    resume_offset: 500,
                    original_limit: 1000,
                },
            ),
        ]
        .into_iter()
        .collect();

        assert!(matches!(
            plan.resume_from(&records),
            Err(YankError::MarkerCorrupt { chunk_id: 0, .. })
        ));
    }
}
