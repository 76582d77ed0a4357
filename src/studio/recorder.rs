//! # 画布遮罩录制模块
//!
//! ## 设计思路
//!
//! 以原图的显示尺寸作为画布，记录用户的每一笔（点序列 + 半径 + 颜色/橡皮擦）。
//! 录制器只保存笔画，不持有像素；导出时交给 `RasterBackend` 栅格化，
//! 背景透明，未触碰的像素 alpha 为 0。
//!
//! ## 实现思路
//!
//! - `begin_stroke` → `stroke_to`* → `end_stroke` 组成一笔；`push_stroke` 可直接写入完整笔画。
//! - `undo` 移除最后一笔（进行中的一笔优先），`clear` 清空全部。
//! - 画笔半径按配置范围收敛（默认 5~60 像素）。
//! - 零笔画导出同样成功，得到全透明图（下游视为“不擦除任何区域”）。

use image::Rgba;

use super::raster::RasterBackend;
use super::source::{BrushMode, DisplaySize, MaskStroke, RawMaskImage, StrokePoint};
use super::{StudioConfig, StudioError};

/// 画布遮罩录制器。
#[derive(Debug, Clone)]
pub struct CanvasMaskRecorder {
    size: DisplaySize,
    min_radius: u32,
    max_radius: u32,
    brush_radius: u32,
    brush_color: Rgba<u8>,
    eraser: bool,
    strokes: Vec<MaskStroke>,
    active: Option<MaskStroke>,
}

impl CanvasMaskRecorder {
    /// 以指定画布尺寸创建录制器，画笔参数取自配置。
    pub fn new(size: DisplaySize, config: &StudioConfig) -> Self {
        Self {
            size,
            min_radius: config.min_brush_radius,
            max_radius: config.max_brush_radius,
            brush_radius: config.clamp_brush_radius(config.default_brush_radius),
            brush_color: Rgba([255, 255, 255, 255]),
            eraser: false,
            strokes: Vec::new(),
            active: None,
        }
    }

    pub fn size(&self) -> DisplaySize {
        self.size
    }

    pub fn brush_radius(&self) -> u32 {
        self.brush_radius
    }

    /// 设置画笔半径，返回收敛后的实际值。
    pub fn set_brush_radius(&mut self, radius: u32) -> u32 {
        self.brush_radius = radius.clamp(self.min_radius, self.max_radius);
        self.brush_radius
    }

    pub fn brush_color(&self) -> Rgba<u8> {
        self.brush_color
    }

    pub fn set_brush_color(&mut self, color: Rgba<u8>) {
        self.brush_color = color;
    }

    pub fn is_eraser(&self) -> bool {
        self.eraser
    }

    pub fn set_eraser(&mut self, enabled: bool) {
        self.eraser = enabled;
    }

    fn current_mode(&self) -> BrushMode {
        if self.eraser {
            BrushMode::Erase
        } else {
            BrushMode::Paint {
                color: self.brush_color.0,
            }
        }
    }

    /// 开始一笔。若上一笔未结束，先将其提交。
    pub fn begin_stroke(&mut self, x: f32, y: f32) {
        self.end_stroke();
        self.active = Some(MaskStroke {
            radius: self.brush_radius,
            mode: self.current_mode(),
            points: vec![StrokePoint { x, y }],
        });
    }

    /// 延续当前笔画；没有进行中的笔画时忽略。
    pub fn stroke_to(&mut self, x: f32, y: f32) {
        match self.active.as_mut() {
            Some(stroke) => stroke.points.push(StrokePoint { x, y }),
            None => log::debug!("stroke_to: 没有进行中的笔画，忽略"),
        }
    }

    /// 结束当前笔画并写入历史。
    pub fn end_stroke(&mut self) {
        if let Some(stroke) = self.active.take() {
            self.strokes.push(stroke);
        }
    }

    /// 直接写入一笔完整笔画（半径同样按范围收敛）。
    pub fn push_stroke(&mut self, mut stroke: MaskStroke) {
        self.end_stroke();
        stroke.radius = stroke.radius.clamp(self.min_radius, self.max_radius);
        self.strokes.push(stroke);
    }

    /// 撤销最后一笔。
    pub fn undo(&mut self) -> Option<MaskStroke> {
        if let Some(active) = self.active.take() {
            return Some(active);
        }
        self.strokes.pop()
    }

    /// 清空全部笔画。
    pub fn clear(&mut self) {
        self.active = None;
        self.strokes.clear();
    }

    pub fn strokes(&self) -> &[MaskStroke] {
        &self.strokes
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len() + usize::from(self.active.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.stroke_count() == 0
    }

    /// 以画布像素尺寸导出原始遮罩。
    ///
    /// 进行中的笔画也会被包含，但不会被提交。
    pub fn export(&self, backend: &dyn RasterBackend) -> Result<RawMaskImage, StudioError> {
        let raster = match &self.active {
            Some(active) => {
                let mut all = self.strokes.clone();
                all.push(active.clone());
                backend.rasterize(&all, self.size.width, self.size.height)?
            }
            None => backend.rasterize(&self.strokes, self.size.width, self.size.height)?,
        };

        log::debug!(
            "🖌️ 遮罩导出完成 - 画布: {}x{} 笔画数: {}",
            self.size.width,
            self.size.height,
            self.stroke_count()
        );

        Ok(RawMaskImage::new(raster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::raster::ImageRasterBackend;

    fn recorder(width: u32, height: u32) -> CanvasMaskRecorder {
        CanvasMaskRecorder::new(DisplaySize { width, height }, &StudioConfig::default())
    }

    #[test]
    fn new_recorder_uses_default_brush() {
        let recorder = recorder(64, 64);

        assert_eq!(recorder.brush_radius(), 15);
        assert_eq!(recorder.brush_color(), Rgba([255, 255, 255, 255]));
        assert!(!recorder.is_eraser());
        assert!(recorder.is_empty());
    }

    #[test]
    fn brush_radius_is_clamped() {
        let mut recorder = recorder(64, 64);

        assert_eq!(recorder.set_brush_radius(2), 5);
        assert_eq!(recorder.set_brush_radius(61), 60);
        assert_eq!(recorder.set_brush_radius(33), 33);
    }

    #[test]
    fn undo_removes_last_stroke_only() {
        let mut recorder = recorder(64, 64);

        recorder.begin_stroke(1.0, 1.0);
        recorder.stroke_to(5.0, 5.0);
        recorder.end_stroke();
        recorder.set_brush_radius(40);
        recorder.begin_stroke(30.0, 30.0);
        recorder.end_stroke();

        let removed = recorder.undo().expect("one stroke should be removed");
        assert_eq!(removed.radius, 40);
        assert_eq!(recorder.stroke_count(), 1);
        assert_eq!(recorder.strokes()[0].points.len(), 2);
    }

    #[test]
    fn undo_prefers_active_stroke() {
        let mut recorder = recorder(64, 64);
        recorder.begin_stroke(1.0, 1.0);
        recorder.end_stroke();
        recorder.begin_stroke(2.0, 2.0);

        let removed = recorder.undo().expect("active stroke should be removed");

        assert_eq!(removed.points[0], StrokePoint { x: 2.0, y: 2.0 });
        assert_eq!(recorder.stroke_count(), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let mut recorder = recorder(64, 64);
        recorder.begin_stroke(1.0, 1.0);
        recorder.end_stroke();
        recorder.begin_stroke(2.0, 2.0);

        recorder.clear();

        assert!(recorder.is_empty());
        assert!(recorder.undo().is_none());
    }

    #[test]
    fn stroke_to_without_begin_is_ignored() {
        let mut recorder = recorder(64, 64);
        recorder.stroke_to(3.0, 3.0);

        assert!(recorder.is_empty());
    }

    #[test]
    fn eraser_toggle_records_erase_mode() {
        let mut recorder = recorder(64, 64);
        recorder.set_eraser(true);
        recorder.begin_stroke(1.0, 1.0);
        recorder.end_stroke();

        assert_eq!(recorder.strokes()[0].mode, BrushMode::Erase);
    }

    #[test]
    fn export_uses_canvas_dimensions() {
        let backend = ImageRasterBackend::new(40_000_000);
        let mut recorder = recorder(40, 24);
        recorder.begin_stroke(10.0, 10.0);

        let raw = recorder.export(&backend).expect("export should succeed");

        assert_eq!(raw.dimensions(), (40, 24));
        assert!(raw.as_rgba().pixels().any(|p| p[3] > 0));
        assert_eq!(recorder.stroke_count(), 1);
    }

    #[test]
    fn empty_export_is_transparent() {
        let backend = ImageRasterBackend::new(40_000_000);
        let raw = recorder(16, 16).export(&backend).expect("export should succeed");

        assert!(raw.as_rgba().pixels().all(|p| p[3] == 0));
    }
}
