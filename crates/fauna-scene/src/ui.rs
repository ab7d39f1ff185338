//! Control widgets for the active group

use bevy_egui::egui;
use fauna_core::{ArController, ControlState, ModelRegistry, SubModelKind};
use std::ops::RangeInclusive;

pub const SCALE_RANGE: RangeInclusive<f32> = 0.1..=3.0;
pub const ROTATION_RANGE: RangeInclusive<f32> = -180.0..=180.0;

/// A user interaction with the controls
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAction {
    Show(SubModelKind),
    Scale(f32),
    RotateDegrees(f32),
}

/// Apply a control action to whatever group is active right now
pub fn apply_action(controller: &mut ArController, action: ControlAction) {
    match action {
        ControlAction::Show(kind) => controller.show_sub_model(kind),
        ControlAction::Scale(factor) => controller.apply_scale(factor),
        ControlAction::RotateDegrees(degrees) => controller.apply_rotation_degrees(degrees),
    }
}

/// One button per sub-model
pub fn render_model_buttons(ui: &mut egui::Ui, registry: &ModelRegistry, ui_scale: f32, actions: &mut Vec<ControlAction>) {
    ui.horizontal(|ui| {
        for spec in registry.iter() {
            let text = egui::RichText::new(&spec.label).size(16.0 * ui_scale);
            if ui.button(text).clicked() {
                actions.push(ControlAction::Show(spec.kind));
            }
        }
    });
}

/// Scale and rotation sliders, seeded from the last written values
pub fn render_transform_sliders(
    ui: &mut egui::Ui,
    controls: &ControlState,
    ui_scale: f32,
    actions: &mut Vec<ControlAction>,
) {
    let mut scale = controls.scale;
    let mut rotation = controls.rotation_degrees;

    ui.horizontal(|ui| {
        ui.label(egui::RichText::new("Scale").size(14.0 * ui_scale));
        if ui
            .add(egui::Slider::new(&mut scale, SCALE_RANGE).step_by(0.01))
            .changed()
        {
            actions.push(ControlAction::Scale(scale));
        }
    });

    ui.horizontal(|ui| {
        ui.label(egui::RichText::new("Rotate").size(14.0 * ui_scale));
        if ui
            .add(egui::Slider::new(&mut rotation, ROTATION_RANGE).step_by(1.0).suffix("°"))
            .changed()
        {
            actions.push(ControlAction::RotateDegrees(rotation));
        }
    });
}
