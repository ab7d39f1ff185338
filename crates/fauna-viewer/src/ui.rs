//! Overlay controls: sub-model buttons, transform sliders and the AR button

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use fauna_scene::ui::{render_model_buttons, render_transform_sliders};
use fauna_scene::{apply_action, SharedController, UiLayout};

use crate::xr::XrBridge;

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, update_ui_layout)
            // Main UI system runs in EguiPrimaryContextPass for proper input handling (bevy_egui 0.38+)
            .add_systems(EguiPrimaryContextPass, ui_system);
    }
}

/// What the AR button does right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArButton {
    Checking,
    Unsupported,
    Enter,
    Exit,
}

impl ArButton {
    fn from_state(supported: Option<bool>, presenting: bool) -> Self {
        match (supported, presenting) {
            (_, true) => ArButton::Exit,
            (None, false) => ArButton::Checking,
            (Some(false), false) => ArButton::Unsupported,
            (Some(true), false) => ArButton::Enter,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ArButton::Checking => "Checking AR...",
            ArButton::Unsupported => "AR not supported",
            ArButton::Enter => "Enter AR",
            ArButton::Exit => "Exit AR",
        }
    }

    fn enabled(self) -> bool {
        matches!(self, ArButton::Enter | ArButton::Exit)
    }
}

fn update_ui_layout(windows: Query<&Window>, mut ui_layout: ResMut<UiLayout>) {
    if let Ok(window) = windows.single() {
        let width = window.width();
        let height = window.height();

        if (ui_layout.screen_width - width).abs() > 1.0 || (ui_layout.screen_height - height).abs() > 1.0 {
            ui_layout.update_from_window(width, height);
        }
    }
}

fn ui_system(
    mut contexts: EguiContexts,
    ui_layout: Res<UiLayout>,
    shared: Res<SharedController>,
    bridge: NonSend<XrBridge>,
) {
    let ui_scale = ui_layout.ui_scale();
    let Ok(ctx) = contexts.ctx_mut() else { return };

    let mut actions = Vec::new();
    let mut toggle_ar = false;
    let button = ArButton::from_state(bridge.supported(), bridge.is_presenting());

    {
        let controller = shared.lock();
        let controls = controller.controls();

        egui::TopBottomPanel::bottom("controls")
            .frame(egui::Frame::NONE.fill(egui::Color32::from_black_alpha(160)).inner_margin(8.0))
            .show(ctx, |ui| {
                render_model_buttons(ui, controller.registry(), ui_scale, &mut actions);
                render_transform_sliders(ui, &controls, ui_scale, &mut actions);
                ui.add_space(4.0);

                let text = egui::RichText::new(button.label()).size(16.0 * ui_scale);
                if ui.add_enabled(button.enabled(), egui::Button::new(text)).clicked() {
                    toggle_ar = true;
                }
            });
    }
    bridge.set_pointer_over_ui(ctx.is_pointer_over_area() || ctx.wants_pointer_input());

    if !actions.is_empty() {
        let mut controller = shared.lock();
        for action in actions {
            apply_action(&mut controller, action);
        }
    }

    if toggle_ar {
        match button {
            ArButton::Enter => bridge.request_session(),
            ArButton::Exit => bridge.end_session(),
            ArButton::Checking | ArButton::Unsupported => {}
        }
    }
}
