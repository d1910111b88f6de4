pub type Endpoint = str;

pub const LOGIN: &Endpoint = "/login";
pub const OWNER_UPDATE: &Endpoint = "/ajax/fetchOwnerUpdate";
pub const INSTALLATION: &Endpoint = "/installation/";
