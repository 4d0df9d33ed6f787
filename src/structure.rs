//! Structure tracking for diagnostics and tests.
//!
//! Writers and readers can optionally record an ordered log of milestones:
//! the byte offset and kind of every structural element they emit or visit.
//! Writers push events in forward (file) order; readers push them in the
//! reverse order of the tail-first walk. The log never influences the stream
//! itself -- it is an observer that tests and debugging sessions query.

use uuid::Uuid;

/// The kind of structural element a milestone marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneKind {
    /// First byte of a series' payload.
    SeriesDataHead,
    /// First byte of a footer whose flavor is not yet known.
    FooterHead,
    /// First byte of a series footer body.
    SeriesFooterHead,
    /// First byte of a stream footer body.
    StreamFooterHead,
    /// A region's boundary-marker byte.
    BoundaryMarker,
    /// First byte of a shadow footer.
    ShadowFooterHead,
    /// A series footer body that decoded successfully.
    SeriesFooterDecoded,
    /// A stream footer body that decoded successfully.
    StreamFooterDecoded,
}

impl MilestoneKind {
    /// Stable label used in rendered tables.
    pub fn label(self) -> &'static str {
        match self {
            MilestoneKind::SeriesDataHead => "series_data_head",
            MilestoneKind::FooterHead => "footer_head",
            MilestoneKind::SeriesFooterHead => "series_footer_head",
            MilestoneKind::StreamFooterHead => "stream_footer_head",
            MilestoneKind::BoundaryMarker => "boundary_marker",
            MilestoneKind::ShadowFooterHead => "shadow_footer_head",
            MilestoneKind::SeriesFooterDecoded => "series_footer_decoded",
            MilestoneKind::StreamFooterDecoded => "stream_footer_decoded",
        }
    }
}

/// Which part of the stream a milestone pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Milestones that pertain to one series.
    Series,
    /// Milestones that pertain to the stream as a whole.
    Stream,
    /// Milestones whose scope cannot be determined yet (common during a
    /// parse, before the footer flavor is known).
    Misc,
}

impl Scope {
    /// Stable label used in rendered tables.
    pub fn label(self) -> &'static str {
        match self {
            Scope::Series => "series",
            Scope::Stream => "stream",
            Scope::Misc => "misc",
        }
    }
}

/// A single recorded milestone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Milestone {
    /// Absolute byte offset in the stream.
    pub offset: u64,
    /// What structural element the offset marks.
    pub kind: MilestoneKind,
    /// Which part of the stream it pertains to.
    pub scope: Scope,
    /// UUID of the series, when known. Often absent during a parse until the
    /// series footer has been decoded.
    pub series_uuid: Option<Uuid>,
    /// Free-form annotation. Not derived from stored data.
    pub comment: Option<String>,
}

/// Ordered log of every milestone recorded for one stream pass.
#[derive(Debug, Default)]
pub struct StreamStructure {
    milestones: Vec<Milestone>,
}

impl StreamStructure {
    /// Create an empty log.
    pub fn new() -> StreamStructure {
        StreamStructure::default()
    }

    /// Record a single milestone.
    pub fn push(
        &mut self,
        offset: u64,
        kind: MilestoneKind,
        scope: Scope,
        series_uuid: Option<Uuid>,
        comment: Option<String>,
    ) {
        self.milestones.push(Milestone {
            offset,
            kind,
            scope,
            series_uuid,
            comment,
        });
    }

    /// All recorded milestones, in recording order.
    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    /// Milestones matching the given kind and/or scope. `None` matches
    /// everything for that dimension.
    pub fn milestones_with_filter(
        &self,
        kind: Option<MilestoneKind>,
        scope: Option<Scope>,
    ) -> Vec<&Milestone> {
        self.milestones
            .iter()
            .filter(|m| kind.is_none_or(|k| m.kind == k))
            .filter(|m| scope.is_none_or(|s| m.scope == s))
            .collect()
    }

    /// All stream-scoped milestones.
    pub fn stream_milestones(&self) -> Vec<&Milestone> {
        self.milestones_with_filter(None, Some(Scope::Stream))
    }

    /// All series-scoped milestones, optionally restricted to one series.
    ///
    /// With a UUID, only milestones between that series' neighbors are
    /// returned: the log is segmented at boundary markers and a segment is
    /// selected when its decoded footer carries the UUID.
    pub fn series_milestones(&self, uuid: Option<Uuid>) -> Vec<&Milestone> {
        let series: Vec<&Milestone> = self.milestones_with_filter(None, Some(Scope::Series));

        let Some(uuid) = uuid else {
            return series;
        };

        let mut current: Vec<&Milestone> = Vec::new();
        let mut matched = false;
        for milestone in series {
            if milestone.kind == MilestoneKind::BoundaryMarker && !current.is_empty() {
                current.push(milestone);
                if matched {
                    return current;
                }
                current.clear();
                matched = false;
                continue;
            }

            if milestone.series_uuid == Some(uuid) {
                matched = true;
            }
            current.push(milestone);
        }

        if matched {
            return current;
        }

        Vec::new()
    }

    /// Series-scoped milestones grouped by series UUID.
    ///
    /// Milestones recorded before a segment's UUID became known are grouped
    /// with the segment they belong to.
    pub fn all_series_milestones(&self) -> Vec<(Uuid, Vec<&Milestone>)> {
        fn flush<'m>(
            groups: &mut Vec<(Uuid, Vec<&'m Milestone>)>,
            current: &mut Vec<&'m Milestone>,
            current_uuid: &mut Option<Uuid>,
        ) {
            if let Some(uuid) = current_uuid.take() {
                groups.push((uuid, std::mem::take(current)));
            } else {
                current.clear();
            }
        }

        let mut groups: Vec<(Uuid, Vec<&Milestone>)> = Vec::new();
        let mut current: Vec<&Milestone> = Vec::new();
        let mut current_uuid: Option<Uuid> = None;

        for milestone in self.milestones.iter().filter(|m| m.scope == Scope::Series) {
            if milestone.kind == MilestoneKind::BoundaryMarker {
                current.push(milestone);
                flush(&mut groups, &mut current, &mut current_uuid);
                continue;
            }

            if current_uuid.is_none() {
                current_uuid = milestone.series_uuid;
            }
            current.push(milestone);
        }

        flush(&mut groups, &mut current, &mut current_uuid);
        groups
    }

    /// Render the log as a stable table.
    ///
    /// The first milestone at each offset shows the offset number; co-located
    /// milestones that follow show a blank offset column, so runs of events
    /// at one position read as a block.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("================\nStream Structure\n================\n\n");

        let mut last_offset: Option<u64> = None;
        for milestone in &self.milestones {
            let offset_column = if last_offset == Some(milestone.offset) {
                " ".repeat(11)
            } else {
                format!("OFF {:<7}", milestone.offset)
            };

            let uuid_column = milestone
                .series_uuid
                .map(|u| u.to_string())
                .unwrap_or_default();

            let comment_column = match &milestone.comment {
                Some(comment) => format!(" {comment}"),
                None => String::new(),
            };

            out.push_str(&format!(
                "{offset_column}  MT {:<24}  SCOPE {:<7}  UUID {:<36}  COMM{}\n",
                milestone.kind.label(),
                milestone.scope.label(),
                uuid_column,
                comment_column
            ));

            last_offset = Some(milestone.offset);
        }

        out
    }
}
