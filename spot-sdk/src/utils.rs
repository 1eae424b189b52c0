use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::{error::Error, wire::RpcResult};

fn map_transport_error<E: fmt::Display>(url: &Url) -> impl FnOnce(E) -> Error + '_ {
    move |e: E| Error::Rpc {
        message: format!("url:{url}: {e}"),
    }
}

pub(crate) fn get<T: DeserializeOwned>(url: Url, token: Option<&str>) -> Result<T, Error> {
    let mut request = ureq::get(url.as_str());
    if let Some(token) = token {
        request = request.set("Authorization", &format!("Bearer {token}"));
    }
    match request.call() {
        Ok(res) => res.into_json::<T>().map_err(map_transport_error(&url)),
        Err(ureq::Error::Status(code, _)) => Err(Error::Response {
            message: format!("url:{url}: status {code}"),
        }),
        Err(e) => Err(map_transport_error(&url)(e)),
    }
}

pub(crate) fn post<T: Serialize, U: DeserializeOwned>(
    url: Url,
    token: Option<&str>,
    msg: &T,
) -> Result<U, Error> {
    let mut request = ureq::post(url.as_str());
    if let Some(token) = token {
        request = request.set("Authorization", &format!("Bearer {token}"));
    }
    match request.send_json(serde_json::to_value(msg).unwrap()) {
        Ok(res) => res.into_json().map_err(map_transport_error(&url)),
        Err(ureq::Error::Status(code, _)) => Err(Error::Response {
            message: format!("url:{url}: status {code}"),
        }),
        Err(e) => Err(map_transport_error(&url)(e)),
    }
}

/// Turns an `is_ok`/`reason` envelope into a `Response` error.
pub(crate) fn check(res: RpcResult) -> Result<(), Error> {
    if !res.is_ok {
        return Err(Error::Response { message: res.reason });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check() {
        assert!(check(RpcResult {
            is_ok: true,
            reason: String::new(),
        })
        .is_ok());
        match check(RpcResult {
            is_ok: false,
            reason: "lease is held".to_owned(),
        }) {
            Err(Error::Response { message }) => assert_eq!(message, "lease is held"),
            res => panic!("unexpected {res:?}"),
        }
    }

    #[test]
    fn test_get_maps_transport_failure_to_rpc() {
        // Port 1 is never bound on loopback.
        let url = Url::parse("http://127.0.0.1:1/robot_id").unwrap();
        match get::<RpcResult>(url, None) {
            Err(Error::Rpc { message }) => assert!(message.contains("127.0.0.1:1")),
            res => panic!("unexpected {res:?}"),
        }
    }
}
