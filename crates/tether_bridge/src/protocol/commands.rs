//! Command names both endpoints agree on.

/// Render → model: the session triad.
pub const READY_FOR_SESSION: &str = "readyForSession";
/// Model → render: the shared session is live.
pub const SESSION_RUNNING: &str = "croquetSessionRunning";
/// Model → render: older name for [`SESSION_RUNNING`].
pub const SESSION_READY: &str = "croquetSessionReady";
/// Model → render: progress while joining; ignored.
pub const JOIN_PROGRESS: &str = "joinProgress";
/// Model → render: the model is going away.
pub const TEAR_DOWN_SESSION: &str = "tearDownSession";
/// Either way: stop.
pub const SHUTDOWN: &str = "shutdown";

/// Model → render: virtual-time beacon.
pub const TEATIME: &str = "_teatime";
/// Model → render: round-trip probe.
pub const PING: &str = "croquetPing";
/// Render → model: probe reply, echoing the probe's argument.
pub const PONG: &str = "unityPong";
/// Either way: a log line from the peer.
pub const LOG: &str = "log";
/// Render → model: a performance trace.
pub const MEASURE: &str = "measure";
/// Model → render: log tiers to enable.
pub const SET_LOG_OPTIONS: &str = "setLogOptions";
/// Model → render: measurement categories to report.
pub const SET_MEASURE_OPTIONS: &str = "setMeasureOptions";

/// Model → render: create an object from a JSON spec.
pub const MAKE_OBJECT: &str = "makeObject";
/// Model → render: remove an object.
pub const DESTROY_OBJECT: &str = "destroyObject";
/// Model → render: attach a child to a parent.
pub const SET_PARENT: &str = "setParent";
/// Model → render: detach a child.
pub const UNPARENT: &str = "unparent";
/// Model → render: mark the local avatar.
pub const REGISTER_AS_AVATAR: &str = "registerAsAvatar";
/// Model → render: clear the local avatar.
pub const UNREGISTER_AS_AVATAR: &str = "unregisterAsAvatar";
/// Model → render: attach the camera to an object.
pub const GRAB_CAMERA: &str = "grabCamera";
/// Model → render: detach the camera.
pub const RELEASE_CAMERA: &str = "releaseCamera";

/// Render → model: creation acknowledgement.
pub const OBJECT_CREATED: &str = "objectCreated";
/// Render → model: the engine moved an object.
pub const OBJECT_MOVED: &str = "objectMoved";
/// Render → model: forwarded input.
pub const EVENT: &str = "event";
