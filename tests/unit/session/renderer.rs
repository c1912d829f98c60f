use std::cell::RefCell;

use super::*;
use crate::document::element::{BlendMode, LayerFilter, VisualElement};
use crate::foundation::core::{BezPath, Uid, Viewport};
use crate::render::cpu::CpuSurface;

fn red() -> Rgba8Premul {
    Rgba8Premul::from_straight_rgba(255, 0, 0, 255)
}

fn opts() -> ExecuteOptions {
    ExecuteOptions::new(Viewport::new(8, 8))
}

fn dest() -> CpuSurface {
    CpuSurface::new(8, 8, SurfaceOptions::default()).expect("dest")
}

fn grouped_doc() -> Document {
    let mut doc = Document::new();
    doc.add_node(
        &Uid::root(),
        None,
        VisualElement::group("g").with_blend(BlendMode::Multiply),
    )
    .unwrap();
    doc.add_node(
        &Uid::from("g"),
        None,
        VisualElement::canvas("c", Bitmap::solid(8, 8, red())),
    )
    .unwrap();
    doc
}

#[tokio::test]
async fn render_writes_destination_and_returns_the_state() {
    let renderer = Renderer::cpu(RendererOpts::default());
    let mut doc = Document::new();
    doc.add_node(
        &Uid::root(),
        None,
        VisualElement::vector(
            "v",
            BezPath::from_svg("M0 0 L4 0 L4 4 L0 4 Z").expect("path"),
        )
        .with_filter(LayerFilter::fill("f", red())),
    )
    .unwrap();
    let mut ctx = DocumentContext::new();
    let mut dest = dest();

    let out = renderer
        .render(&mut doc, &mut ctx, &mut dest, opts())
        .await
        .unwrap();
    assert_eq!(dest.pixel(1, 1), Some([255, 0, 0, 255]));
    assert_eq!(dest.pixel(6, 6), Some([0, 0, 0, 0]));
    assert!(out.bounding_boxes.contains_key(&Uid::from("v")));
    assert!(ctx.metrics.bounding_box(&Uid::from("v")).is_some());
    assert!(!renderer.is_busy());
    assert_eq!(renderer.allocator_stats().await.unwrap().in_use, 0);
}

#[tokio::test]
async fn renderer_background_applies_when_the_pass_sets_none() {
    let renderer = Renderer::cpu(RendererOpts {
        background: Some(Rgba8Premul::from_straight_rgba(255, 255, 255, 255)),
        ..RendererOpts::default()
    });
    let mut doc = Document::new();
    let mut ctx = DocumentContext::new();

    let (bitmap, _) = renderer
        .render_bitmap(&mut doc, &mut ctx, opts())
        .await
        .unwrap();
    assert_eq!(bitmap.pixel(0, 0), Some([255, 255, 255, 255]));

    let mut black = opts();
    black.background = Some(Rgba8Premul::from_straight_rgba(0, 0, 0, 255));
    let (bitmap, _) = renderer
        .render_bitmap(&mut doc, &mut ctx, black)
        .await
        .unwrap();
    assert_eq!(bitmap.pixel(0, 0), Some([0, 0, 0, 255]));
}

#[tokio::test]
async fn document_edits_reach_the_cache_between_passes() {
    let renderer = Renderer::cpu(RendererOpts::default());
    let mut doc = grouped_doc();
    let mut ctx = DocumentContext::new();

    let (_, out) = renderer.render_bitmap(&mut doc, &mut ctx, opts()).await.unwrap();
    assert_eq!(out.stats.cache_writes, 1);
    let (_, out) = renderer.render_bitmap(&mut doc, &mut ctx, opts()).await.unwrap();
    assert_eq!(out.stats.cache_hits, 1);

    doc.update_element(&Uid::from("c"), |e| e.opacity = 0.0)
        .unwrap();
    let (bitmap, out) = renderer.render_bitmap(&mut doc, &mut ctx, opts()).await.unwrap();
    assert_eq!(out.stats.cache_hits, 0);
    assert_eq!(bitmap.pixel(2, 2), Some([0, 0, 0, 0]));
}

#[tokio::test]
async fn concurrent_renders_wait_for_the_state() {
    let renderer = Renderer::cpu(RendererOpts::default());
    let mut doc = grouped_doc();
    let mut ctx = DocumentContext::new();
    let order = RefCell::new(Vec::new());

    let held = renderer.state.acquire().await.unwrap();
    let r = &renderer;
    let order_ref = &order;
    let (rendered, ()) = tokio::join!(
        async {
            let out = r.render_bitmap(&mut doc, &mut ctx, opts()).await;
            order_ref.borrow_mut().push("render");
            out
        },
        async move {
            tokio::task::yield_now().await;
            assert_eq!(r.state.waiters(), 1);
            assert!(r.is_busy());
            order_ref.borrow_mut().push("release");
            r.state.release(held).unwrap();
        }
    );

    let (bitmap, _) = rendered.unwrap();
    assert_eq!(bitmap.pixel(0, 0), Some([255, 0, 0, 255]));
    assert_eq!(*order.borrow(), vec!["release", "render"]);
    assert!(!renderer.is_busy());
}

#[tokio::test]
async fn cancelled_pass_releases_state_and_surfaces() {
    let renderer = Renderer::cpu(RendererOpts::default());
    let mut doc = grouped_doc();
    let mut ctx = DocumentContext::new();
    let opts = opts();
    opts.cancel.cancel();

    let err = renderer
        .render(&mut doc, &mut ctx, &mut dest(), opts)
        .await
        .expect_err("cancelled");
    assert!(err.is_cancelled());
    assert!(!renderer.is_busy());
    assert_eq!(renderer.allocator_stats().await.unwrap().in_use, 0);
}

#[tokio::test]
async fn forced_gc_empties_the_pool() {
    let renderer = Renderer::cpu(RendererOpts::default());
    let mut doc = grouped_doc();
    let mut ctx = DocumentContext::new();
    renderer.render_bitmap(&mut doc, &mut ctx, opts()).await.unwrap();

    let before = renderer.allocator_stats().await.unwrap().entries;
    assert!(before > 0);
    assert_eq!(renderer.gc(true).await.unwrap(), before);
    assert_eq!(renderer.allocator_stats().await.unwrap().entries, 0);
}
