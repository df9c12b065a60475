use std::rc::Rc;

use half::f16;
use scene_ngin::{
    AttributeBuffer, AttributeRole, AttributeSet, DisplayDevice, DrawMode, HeadlessDevice,
    IndexBuffer, RenderError, ScalarType,
    data_structures::attribute::UnsignedInt2_10_10_10Rev,
};

use crate::common::test_utils::floats;

mod common;

fn device() -> (Rc<HeadlessDevice>, Rc<dyn DisplayDevice>) {
    let headless = HeadlessDevice::shared("headless");
    let device: Rc<dyn DisplayDevice> = headless.clone();
    (headless, device)
}

#[test]
fn switching_index_width_keeps_only_the_last_buffer() {
    let (headless, device) = device();
    let mut set = AttributeSet::new(DrawMode::Triangles, true, true, false);
    set.bind(&device).unwrap();

    set.update_indices_u16(&[0, 1, 2, 2, 1, 3]).unwrap();
    let wide = set.index_handle().unwrap();
    set.update_indices_u8(&[0, 1, 2]).unwrap();

    assert_eq!(set.indices(), Some(&IndexBuffer::U8(vec![0, 1, 2])));
    assert_eq!(set.index_width(), Some(1));
    let narrow = set.index_handle().unwrap();
    assert_ne!(wide, narrow);
    assert!(headless.buffer_contents(wide).is_none());
    assert_eq!(headless.buffer_contents(narrow).unwrap(), vec![0, 1, 2]);
    assert_eq!(headless.stats().live_buffers(), 1);
}

#[test]
fn index_updates_require_an_indexed_set() {
    let mut set = AttributeSet::new(DrawMode::Lines, false, false, false);
    assert!(matches!(set.update_indices_u32(&[0, 1]), Err(RenderError::NotIndexed)));
    assert!(matches!(set.update_indices_u8(&[0, 1]), Err(RenderError::NotIndexed)));
    assert!(set.indices().is_none());
}

#[test]
fn shrinking_update_keeps_the_handle() {
    let (headless, device) = device();
    let mut buffer = AttributeBuffer::<f32>::new("weights", AttributeRole::Unknown, 1, false, 0, 0, 0);
    buffer.update(&[1.0, 2.0, 3.0]).unwrap();
    let handle = buffer.bind(&device).unwrap();

    buffer.update_owned(vec![4.0, 5.0]).unwrap();

    assert_eq!(buffer.data(), &[4.0, 5.0]);
    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.handle(), Some(handle));
    assert_eq!(buffer.allocated_bytes(), 12);
    assert_eq!(headless.stats().buffers_created, 1);
    assert_eq!(floats(&headless.buffer_contents(handle).unwrap())[..2], [4.0, 5.0]);
}

#[test]
fn growing_update_reallocates() {
    let (headless, device) = device();
    let mut buffer = AttributeBuffer::<u16>::new("ids", AttributeRole::Unknown, 1, false, 0, 0, 0);
    buffer.update(&[1, 2]).unwrap();
    let before = buffer.bind(&device).unwrap();

    buffer.update(&[1, 2, 3, 4]).unwrap();

    let after = buffer.handle().unwrap();
    assert_ne!(before, after);
    assert_eq!(buffer.allocated_bytes(), 8);
    assert_eq!(headless.stats().live_buffers(), 1);
}

#[test]
fn copy_and_move_read_back_unchanged() {
    let mut buffer = AttributeBuffer::<f16>::new("uv", AttributeRole::Texture, 2, false, 0, 0, 0);
    let source = [f16::from_f32(0.5), f16::from_f32(1.0)];
    buffer.update(&source).unwrap();
    assert_eq!(buffer.data(), &source);

    let owned = vec![f16::from_f32(0.25); 4];
    buffer.update_owned(owned.clone()).unwrap();
    assert_eq!(buffer.data(), owned.as_slice());
}

#[test]
fn sub_range_updates_check_the_allocation() {
    let (_, device) = device();
    let mut buffer = AttributeBuffer::<u32>::new("ids", AttributeRole::Unknown, 1, false, 0, 0, 0);
    buffer.update(&[0; 4]).unwrap();

    match buffer.update_range(1, &[7]) {
        Err(RenderError::BufferNotAllocated { offset, .. }) => assert_eq!(offset, 4),
        other => panic!("unexpected {other:?}"),
    }

    buffer.bind(&device).unwrap();
    buffer.update_range(1, &[7, 8]).unwrap();
    assert_eq!(buffer.data(), &[0, 7, 8, 0]);

    match buffer.update_range(3, &[1, 2]) {
        Err(RenderError::RangeOutOfBounds {
            offset,
            size,
            allocated,
            ..
        }) => assert_eq!((offset, size, allocated), (12, 8, 16)),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn one_set_holds_channels_of_different_types() {
    let (headless, device) = device();
    let mut set = AttributeSet::new(DrawMode::Points, true, false, true);
    let positions = set
        .add_attribute_description::<f32>(AttributeRole::Position, 3, false, 0, 0, 0)
        .unwrap();
    let normals = set
        .add_attribute_description::<UnsignedInt2_10_10_10Rev>(AttributeRole::Normal, 4, true, 0, 0, 0)
        .unwrap();
    let colours = set
        .add_attribute_description::<u8>(AttributeRole::Color, 4, true, 0, 0, 1)
        .unwrap();

    positions.borrow_mut().update(&[0.0; 6]).unwrap();
    normals
        .borrow_mut()
        .update(&[UnsignedInt2_10_10_10Rev::pack(1, 2, 3, 0); 2])
        .unwrap();
    colours.borrow_mut().update(&[255; 12]).unwrap();

    assert_eq!(set.vertex_count(), 2);
    assert_eq!(set.instance_count(), 3);
    assert_eq!(
        set.attributes()
            .iter()
            .map(|a| a.borrow().descriptor().scalar_type())
            .collect::<Vec<_>>(),
        [ScalarType::Float, ScalarType::UnsignedInt2_10_10_10Rev, ScalarType::UnsignedByte]
    );

    let handles = set.bind(&device).unwrap();
    assert_eq!(handles.len(), 3);
    assert_eq!(headless.stats().live_buffers(), 3);
    assert_eq!(set.vertex_layouts().len(), 3);
}
