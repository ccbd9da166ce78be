use super::{v1_segment, PipelineError, Stage, StageContext, UtteranceTable, WarningKind};
use indicatif::ProgressBar;

/// Root-mean-square amplitude of each row's V1 segment.
pub fn measure_rms(
    table: &mut UtteranceTable,
    ctx: &mut StageContext<'_>,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    for row in table.rows_mut() {
        pb.inc(1);
        row.measures.v1_rms = None;
        let Some(span) = row.v1_span() else {
            ctx.report(Stage::Rms, row, WarningKind::SpanMissing);
            continue;
        };
        let segment = v1_segment(Stage::Rms, row, ctx.analyzer, span)?;
        match segment.rms() {
            Some(rms) => row.measures.v1_rms = Some(rms),
            None => ctx.report(Stage::Rms, row, WarningKind::Undefined { measure: "v1_rms" }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::UtteranceTable;
    use super::*;

    #[test]
    fn test_rms_of_stub_sine() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![utterance(dir.path(), "AH_95", "0018", &vowel_grid((0.1, 0.3)))];
        let mut table = UtteranceTable::from_files(files).unwrap();
        run(&[Stage::VowelDuration, Stage::Rms], &mut table, &StubAnalyzer::default()).unwrap();

        // 0.5 amplitude sine
        let rms = table.rows()[0].measures.v1_rms.unwrap();
        assert!((rms - 0.5 / 2f64.sqrt()).abs() < 1e-3, "got {rms}");
    }

    #[test]
    fn test_missing_span_warns() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![utterance(
            dir.path(),
            "AH_95",
            "0018",
            &crate::textgrid::tests::long_format(&[], &[]),
        )];
        let mut table = UtteranceTable::from_files(files).unwrap();
        let sink = run(&[Stage::VowelDuration, Stage::Rms], &mut table, &StubAnalyzer::default()).unwrap();

        assert_eq!(table.rows()[0].measures.v1_rms, None);
        let rms_warnings = sink.for_stage(Stage::Rms);
        assert_eq!(rms_warnings.len(), 1);
        assert_eq!(rms_warnings[0].kind, WarningKind::SpanMissing);
    }
}
