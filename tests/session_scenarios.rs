use std::io::Cursor;

use chequemark::compositor::rgba_from_pixmap;
use chequemark::config::EngineConfig;
use chequemark::element::{ElementId, ElementKind};
use chequemark::interaction::{PointerEvent, PointerPhase};
use chequemark::session::{PointerOutcome, Session};
use chequemark::viewport::{Point, Rect};
use image::{ImageFormat, Rgba, RgbaImage};

const PAPER: [u8; 4] = [250, 250, 250, 255];
const RED: [u8; 4] = [220, 20, 20, 255];

fn cheque_session() -> Session {
    let mut session = Session::new(EngineConfig::default()).expect("default config is valid");
    session.set_viewport_width(880.0);
    session
        .load_base(&RgbaImage::from_pixel(1000, 600, Rgba(PAPER)))
        .expect("base should load");
    session
}

/// A 200x100 red element placed at image (100, 100), i.e. display (80, 80).
fn place_red_block(session: &mut Session) -> ElementId {
    let id = session
        .add_bitmap(
            ElementKind::Signature,
            &RgbaImage::from_pixel(200, 100, Rgba(RED)),
            None,
        )
        .expect("bitmap should be accepted")
        .expect("base is loaded");
    assert!(session.set_geometry(id, Rect::new(100.0, 100.0, 200.0, 100.0)));
    id
}

fn mouse(phase: PointerPhase, x: f32, y: f32) -> PointerEvent {
    PointerEvent::mouse(phase, x, y)
}

fn output_pixel(session: &Session, x: u32, y: u32) -> [u8; 4] {
    rgba_from_pixmap(session.output().expect("output exists")).get_pixel(x, y).0
}

fn assert_near(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-3,
        "expected {expected}, got {actual}"
    );
}

fn assert_pixel_near(actual: [u8; 4], expected: [u8; 4]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!(a.abs_diff(e) <= 2, "expected {expected:?}, got {actual:?}");
    }
}

fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

#[test]
fn image_rect_maps_to_display_rect_at_scale_point_eight() {
    let mut session = cheque_session();
    assert_near(session.scale().unwrap(), 0.8);

    let id = place_red_block(&mut session);
    let view = session.view(id).unwrap();
    assert_near(view.display.x, 80.0);
    assert_near(view.display.y, 80.0);
    assert_near(view.display.width, 160.0);
    assert_near(view.display.height, 80.0);

    let (display_width, display_height) = session.element(id).unwrap().display_size();
    assert_near(display_width, 160.0);
    assert_near(display_height, 80.0);
}

#[test]
fn drag_past_left_edge_clamps_before_conversion() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);

    // Grab the body 80px right and 40px below the element's display corner.
    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Down, 160.0, 120.0)),
        PointerOutcome::DragStarted(id)
    );
    // Unclamped target would be display (-20, 50).
    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Move, 60.0, 90.0)),
        PointerOutcome::Updated(id)
    );

    let view = session.view(id).unwrap();
    assert_near(view.display.x, 0.0);
    assert_near(view.display.y, 50.0);
    assert_near(view.rect.x, 0.0);
    assert_near(view.rect.y, 62.5);

    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Up, 60.0, 90.0)),
        PointerOutcome::Ended
    );
    assert!(session.gesture().is_idle());
}

#[test]
fn touch_drag_matches_mouse_drag() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);

    let down = PointerEvent::touch(PointerPhase::Down, vec![Point::new(160.0, 120.0)]);
    let moved = PointerEvent::touch(PointerPhase::Move, vec![Point::new(200.0, 150.0)]);
    let ended = PointerEvent::touch(PointerPhase::Up, Vec::new());
    assert_eq!(session.handle_pointer(&down), PointerOutcome::DragStarted(id));
    session.handle_pointer(&moved);
    assert_eq!(session.handle_pointer(&ended), PointerOutcome::Ended);

    let view = session.view(id).unwrap();
    assert_near(view.display.x, 120.0);
    assert_near(view.display.y, 110.0);
}

#[test]
fn overlay_origin_offsets_client_points() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);
    session.set_overlay_origin(Point::new(300.0, 40.0));

    assert!(session.hit_test(Point::new(160.0, 120.0)).is_none());
    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Down, 460.0, 160.0)),
        PointerOutcome::DragStarted(id)
    );
}

#[test]
fn resize_handle_scales_with_locked_aspect() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);

    // Bottom-right corner of display rect (80, 80, 160, 80).
    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Down, 235.0, 155.0)),
        PointerOutcome::ResizeStarted(id)
    );
    session.handle_pointer(&mouse(PointerPhase::Move, 275.0, 160.0));
    session.handle_pointer(&mouse(PointerPhase::Up, 275.0, 160.0));

    let view = session.view(id).unwrap();
    assert_near(view.display.width, 200.0);
    assert_near(view.display.height, 100.0);
    assert_near(view.rect.width, 250.0);
    assert_near(view.rect.height, 125.0);
    assert_near(view.rect.width / view.rect.height, 2.0);
}

#[test]
fn resize_is_limited_by_overlay_edge() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);

    session.handle_pointer(&mouse(PointerPhase::Down, 235.0, 155.0));
    session.handle_pointer(&mouse(PointerPhase::Move, 5000.0, 160.0));

    // Display x is 80 on an 800px overlay, so at most 720 wide.
    let view = session.view(id).unwrap();
    assert!(view.display.width <= 720.0 + 1e-3);
    assert!(view.display.right() <= 800.0 + 1e-3);
    assert!(view.display.bottom() <= 480.0 + 1e-3);
    assert_near(view.display.width / view.display.height, 2.0);
}

#[test]
fn viewport_resize_keeps_display_sizes_consistent() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);

    session.set_viewport_width(580.0);
    assert_near(session.scale().unwrap(), 0.5);
    let element = session.element(id).unwrap();
    let (display_width, display_height) = element.display_size();
    assert_near(display_width, element.rect().width * 0.5);
    assert_near(display_height, element.rect().height * 0.5);

    let (overlay_width, overlay_height) = session.overlay_size().unwrap();
    assert_near(overlay_width, 500.0);
    assert_near(overlay_height, 300.0);
}

#[test]
fn four_rotations_return_to_start() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(session.rotate(id).unwrap());
    }
    // The rotate control turns with the element: at 270 degrees the display
    // rect's top-left corner is drawn at the bottom-left of the footprint.
    let outcome = session.handle_pointer(&mouse(PointerPhase::Down, 125.0, 195.0));
    assert_eq!(outcome, PointerOutcome::Rotated(id, 0));
    assert_eq!(seen, vec![90, 180, 270]);
    assert!(session.gesture().is_idle());
}

#[test]
fn rotated_element_is_drawn_about_its_center() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);
    session.rotate(id);

    // Center stays at (200, 150); the 200x100 block now spans x 150..250.
    assert_pixel_near(output_pixel(&session, 200, 150), RED);
    assert_pixel_near(output_pixel(&session, 200, 230), RED);
    assert_pixel_near(output_pixel(&session, 120, 150), PAPER);
}

#[test]
fn rotated_element_is_grabbed_by_its_drawn_footprint() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);
    session.rotate(id);

    // Display footprint is now x 120..200, y 40..200 around center (160, 120).
    assert!(session.hit_test(Point::new(230.0, 120.0)).is_none());
    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Down, 160.0, 50.0)),
        PointerOutcome::DragStarted(id)
    );
}

#[test]
fn geometry_outside_the_cheque_is_pulled_back_onto_it() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);

    assert!(session.set_geometry(id, Rect::new(5000.0, 4000.0, 200.0, 100.0)));
    let view = session.view(id).unwrap();
    assert_eq!(view.rect, Rect::new(800.0, 500.0, 200.0, 100.0));
    assert_pixel_near(output_pixel(&session, 900, 550), RED);
    assert_eq!(session.hit_test(Point::new(720.0, 440.0)).map(|hit| hit.0), Some(id));

    assert!(session.set_geometry(id, Rect::new(-50.0, 20.0, 3000.0, 600.0)));
    let view = session.view(id).unwrap();
    assert_near(view.rect.x, 0.0);
    assert_near(view.rect.width, 1000.0);
    assert_near(view.rect.height, 200.0);
    assert_near(view.rect.y, 20.0);
}

#[test]
fn pressing_the_middle_of_a_tiny_upload_starts_a_drag() {
    let mut session = cheque_session();
    let id = session
        .add_bitmap(
            ElementKind::Signature,
            &RgbaImage::from_pixel(20, 20, Rgba(RED)),
            None,
        )
        .unwrap()
        .unwrap();
    let display = session.view(id).unwrap().display;
    assert!(display.width < 40.0);

    let center = display.center();
    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Down, center.x, center.y)),
        PointerOutcome::DragStarted(id)
    );
    assert_eq!(session.elements().len(), 1);
}

#[test]
fn removed_element_is_gone_from_list_and_render() {
    let mut session = cheque_session();
    let keep = place_red_block(&mut session);
    let doomed = place_red_block(&mut session);
    assert_pixel_near(output_pixel(&session, 200, 150), RED);

    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Down, 235.0, 85.0)),
        PointerOutcome::Removed(doomed)
    );
    assert!(session.element(doomed).is_none());
    assert_eq!(session.elements().len(), 1);
    assert_eq!(session.elements()[0].id(), keep);

    assert!(session.remove_element(keep));
    assert!(!session.remove_element(keep));
    assert_pixel_near(output_pixel(&session, 200, 150), PAPER);
}

#[test]
fn gesture_on_removed_element_returns_to_idle() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);

    session.handle_pointer(&mouse(PointerPhase::Down, 160.0, 120.0));
    assert!(!session.gesture().is_idle());
    session.clear_elements();

    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Move, 200.0, 200.0)),
        PointerOutcome::Ignored
    );
    assert!(session.gesture().is_idle());
    assert!(session.rotate(id).is_none());
    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Up, 200.0, 200.0)),
        PointerOutcome::Ignored
    );
}

#[test]
fn second_pointer_down_does_not_steal_active_gesture() {
    let mut session = cheque_session();
    let id = place_red_block(&mut session);

    session.handle_pointer(&mouse(PointerPhase::Down, 160.0, 120.0));
    assert_eq!(
        session.handle_pointer(&mouse(PointerPhase::Down, 235.0, 155.0)),
        PointerOutcome::Ignored
    );
    assert_eq!(session.gesture().target(), Some(id));
    assert_eq!(session.gesture().name(), "dragging");
}

#[test]
fn pending_upload_is_skipped_until_decoded() {
    let mut session = cheque_session();
    let bytes = png_bytes(&RgbaImage::from_pixel(120, 40, Rgba([10, 10, 10, 255])));
    let id = session
        .add_upload(ElementKind::Signature, bytes, None)
        .unwrap()
        .expect("upload should be placed");

    // Placement is known from the header before pixels are ready.
    let view = session.view(id).unwrap();
    assert!(!view.ready);
    assert_near(view.rect.width, 120.0);
    assert_near(view.rect.y, 600.0 - 40.0 - 50.0);
    assert_eq!(session.last_render().pending, 1);
    assert_eq!(session.last_render().drawn, 0);

    assert_eq!(session.wait_for_decodes(), 1);
    assert_eq!(session.pending_decodes(), 0);
    assert_eq!(session.last_render().drawn, 1);
    assert_pixel_near(output_pixel(&session, 500, 530), [10, 10, 10, 255]);
}

#[test]
fn pumping_decodes_eventually_completes_upload() {
    let mut session = cheque_session();
    let bytes = png_bytes(&RgbaImage::from_pixel(64, 64, Rgba([30, 30, 30, 255])));
    session
        .add_upload(ElementKind::Signature, bytes, Some(false))
        .unwrap();

    let mut completed = 0;
    while completed == 0 {
        completed = session.pump_decodes();
        std::thread::yield_now();
    }
    assert_eq!(session.pending_decodes(), 0);
    assert_eq!(session.last_render().drawn, 1);
}

#[test]
fn mark_upload_keeps_only_ink() {
    let mut session = cheque_session();
    let mut photo = RgbaImage::from_pixel(200, 100, Rgba([236, 230, 214, 255]));
    for y in 40..60 {
        for x in 20..180 {
            photo.put_pixel(x, y, Rgba([40, 35, 30, 255]));
        }
    }
    let id = session
        .add_upload(ElementKind::Mark, png_bytes(&photo), None)
        .unwrap()
        .unwrap();
    session.wait_for_decodes();
    assert!(session.set_geometry(id, Rect::new(0.0, 0.0, 200.0, 100.0)));

    assert_pixel_near(output_pixel(&session, 100, 50), [0, 0, 0, 255]);
    // Cream paper around the ink is transparent, so the base shows through.
    assert_pixel_near(output_pixel(&session, 100, 10), PAPER);
}

#[test]
fn text_stamp_is_added_as_ready_element() {
    let mut session = cheque_session();
    let id = session
        .add_text_stamp(&Default::default())
        .unwrap()
        .expect("base is loaded");

    let view = session.view(id).unwrap();
    assert_eq!(view.kind, ElementKind::Text);
    assert_eq!(view.label, "Text Stamp");
    assert!(view.ready);
    // Centered on the base.
    assert_near(view.rect.x + view.rect.width / 2.0, 500.0);
    assert_near(view.rect.y + view.rect.height / 2.0, 300.0);
    assert_pixel_near(output_pixel(&session, 0, 0), PAPER);
}

#[test]
fn exported_png_matches_base_dimensions() {
    let mut session = cheque_session();
    place_red_block(&mut session);
    let png = session.export_png().unwrap();
    let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (1000, 600));
    assert_pixel_near(decoded.get_pixel(200, 150).0, RED);
}
