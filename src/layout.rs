//! Output layout: outputs side by side, left to right.

use crate::registry::NativeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub output: NativeHandle,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Default)]
pub struct OutputLayout {
    placements: Vec<Placement>,
}

impl OutputLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Right edge of the rightmost output.
    pub fn implicit_width(&self) -> i32 {
        self.placements
            .iter()
            .map(|p| p.x + p.width)
            .max()
            .unwrap_or(0)
    }

    pub fn implicit_height(&self) -> i32 {
        self.placements
            .iter()
            .map(|p| p.y + p.height)
            .max()
            .unwrap_or(0)
    }

    /// Places `output` at the current accumulated width and returns its slot.
    pub fn place_right(&mut self, output: NativeHandle, width: i32, height: i32) -> Placement {
        let placement = Placement {
            output,
            x: self.implicit_width(),
            y: 0,
            width,
            height,
        };
        self.placements.retain(|p| p.output != output);
        self.placements.push(placement);
        placement
    }

    pub fn remove(&mut self, output: NativeHandle) -> Option<Placement> {
        let index = self.placements.iter().position(|p| p.output == output)?;
        Some(self.placements.remove(index))
    }

    pub fn placement(&self, output: NativeHandle) -> Option<Placement> {
        self.placements.iter().copied().find(|p| p.output == output)
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_accumulate_to_the_right() {
        let mut layout = OutputLayout::new();
        let a = layout.place_right(NativeHandle::from_raw(1), 1920, 1080);
        let b = layout.place_right(NativeHandle::from_raw(2), 1280, 1024);

        assert_eq!((a.x, b.x), (0, 1920));
        assert_eq!(layout.implicit_width(), 3200);
        assert_eq!(layout.implicit_height(), 1080);
    }

    #[test]
    fn removal_keeps_other_positions() {
        let mut layout = OutputLayout::new();
        layout.place_right(NativeHandle::from_raw(1), 800, 600);
        layout.place_right(NativeHandle::from_raw(2), 800, 600);
        layout.remove(NativeHandle::from_raw(1));

        assert_eq!(layout.placement(NativeHandle::from_raw(2)).map(|p| p.x), Some(800));
        assert_eq!(layout.implicit_width(), 1600);
        assert!(layout.remove(NativeHandle::from_raw(1)).is_none());
    }
}
