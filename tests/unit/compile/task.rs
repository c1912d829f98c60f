use super::*;
use crate::document::element::BlendMode;

#[test]
fn accessors_report_target_sources_and_uid() {
    let t = RenderTask::DrawSourceToDest {
        source: RenderTarget::Dynamic(3),
        target: RenderTarget::PreDest,
        composite: CompositeOp::Blend(BlendMode::Multiply),
        opacity: 0.5,
        cache_as: Some(Uid::from("g")),
    };
    assert_eq!(t.target(), RenderTarget::PreDest);
    assert_eq!(t.sources(), Some(RenderTarget::Dynamic(3)));
    assert_eq!(t.uid(), Some(&Uid::from("g")));

    let c = RenderTask::ClearTarget {
        target: RenderTarget::SharedFilterBuf,
    };
    assert_eq!(c.sources(), None);
    assert_eq!(c.uid(), None);
}

#[test]
fn dump_is_stable() {
    let tasks = vec![
        RenderTask::ClearTarget {
            target: RenderTarget::PreDest,
        },
        RenderTask::DrawVisuToDest {
            uid: Uid::from("canvas"),
            target: RenderTarget::PreDest,
            transform: Affine::IDENTITY,
            composite: CompositeOp::NORMAL,
            opacity: 1.0,
        },
        RenderTask::ApplyPostprocessFilter {
            uid: Uid::from("v"),
            filter_uid: Uid::from("blur"),
            source: RenderTarget::Dynamic(0),
            target: RenderTarget::SharedFilterBuf,
        },
    ];
    let expected = "tasks: 3\n\
                    \x20 T0: CLEAR_TARGET PRE_DEST\n\
                    \x20 T1: DRAW_VISU_TO_DEST PRE_DEST uid=canvas op=normal alpha=1.000\n\
                    \x20 T2: APPLY_POSTPROCESS_FILTER DYN0 -> SHARED_FILTER_BUF uid=v filter=blur\n";
    assert_eq!(dump(&tasks), expected);
}
