//! Typed requests.
//!
//! Every request shape is tied to its wire discriminator and the
//! response shape it decodes to; the session is generic over the pair.
//! Shapes not covered here can be added by implementing
//! [`ClientRequest`] on any serializable struct.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A concrete request tied to its wire discriminator and response
/// shape.
pub trait ClientRequest: Serialize + Send {
    const NAME: &'static str;
    type Response: DeserializeOwned + Send + 'static;
}

macro_rules! client_request {
    ($($shape:ident => $name:literal / $response:ty),* $(,)?) => {
        $(impl ClientRequest for $shape {
            const NAME: &'static str = $name;
            type Response = $response;
        })*
    };
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetVersion;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetVersionResponse {
    pub obs_version: String,
    #[serde(default)]
    pub obs_web_socket_version: String,
    #[serde(default)]
    pub rpc_version: u32,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub available_requests: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetStudioModeEnabled;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStudioModeEnabledResponse {
    pub studio_mode_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStudioModeEnabled {
    pub studio_mode_enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TriggerStudioModeTransition;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetCurrentProgramScene;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCurrentProgramSceneResponse {
    pub current_program_scene_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCurrentProgramScene {
    pub scene_name: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetCurrentPreviewScene;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCurrentPreviewSceneResponse {
    pub current_preview_scene_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCurrentPreviewScene {
    pub scene_name: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetSceneList;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneListEntry {
    pub scene_name: String,
    #[serde(default)]
    pub scene_index: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSceneListResponse {
    #[serde(default)]
    pub current_program_scene_name: Option<String>,
    #[serde(default)]
    pub current_preview_scene_name: Option<String>,
    pub scenes: Vec<SceneListEntry>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetStreamStatus;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStreamStatusResponse {
    pub output_active: bool,
    #[serde(default)]
    pub output_reconnecting: bool,
    #[serde(default)]
    pub output_timecode: String,
    #[serde(default)]
    pub output_duration: u64,
    #[serde(default)]
    pub output_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StartStream;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StopStream;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ToggleStream;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleStreamResponse {
    pub output_active: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetRecordStatus;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRecordStatusResponse {
    pub output_active: bool,
    #[serde(default)]
    pub output_paused: bool,
    #[serde(default)]
    pub output_timecode: String,
    #[serde(default)]
    pub output_duration: u64,
    #[serde(default)]
    pub output_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StartRecord;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StopRecord;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRecordResponse {
    #[serde(default)]
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetInputMute {
    pub input_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetInputMuteResponse {
    pub input_muted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInputMute {
    pub input_name: String,
    pub input_muted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleInputMute {
    pub input_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleInputMuteResponse {
    pub input_muted: bool,
}

client_request!(
    GetVersion => "GetVersion" / GetVersionResponse,
    GetStudioModeEnabled => "GetStudioModeEnabled" / GetStudioModeEnabledResponse,
    SetStudioModeEnabled => "SetStudioModeEnabled" / (),
    TriggerStudioModeTransition => "TriggerStudioModeTransition" / (),
    GetCurrentProgramScene => "GetCurrentProgramScene" / GetCurrentProgramSceneResponse,
    SetCurrentProgramScene => "SetCurrentProgramScene" / (),
    GetCurrentPreviewScene => "GetCurrentPreviewScene" / GetCurrentPreviewSceneResponse,
    SetCurrentPreviewScene => "SetCurrentPreviewScene" / (),
    GetSceneList => "GetSceneList" / GetSceneListResponse,
    GetStreamStatus => "GetStreamStatus" / GetStreamStatusResponse,
    StartStream => "StartStream" / (),
    StopStream => "StopStream" / (),
    ToggleStream => "ToggleStream" / ToggleStreamResponse,
    GetRecordStatus => "GetRecordStatus" / GetRecordStatusResponse,
    StartRecord => "StartRecord" / (),
    StopRecord => "StopRecord" / StopRecordResponse,
    GetInputMute => "GetInputMute" / GetInputMuteResponse,
    SetInputMute => "SetInputMute" / (),
    ToggleInputMute => "ToggleInputMute" / ToggleInputMuteResponse,
);
