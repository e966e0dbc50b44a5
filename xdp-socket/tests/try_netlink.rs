//! Black-box netlink smoke tests: same queries as `util::tests::netlink`,
//! run against this host's actual routing table and addresses rather than
//! a mocked one, from outside the crate boundary.

#[test]
fn test_list_routes() {
    let all_routes = xdp_socket::util::get_ipv4_routes(None).unwrap();
    let gw = xdp_socket::util::find_default_gateway(&all_routes).unwrap();
    println!("default GW: {:#?} ", gw);
    let routes = xdp_socket::util::get_ipv4_routes(Some(gw.if_index)).unwrap();
    println!("{:#?}", routes);
}

#[test]
fn list_neighbors() {
    let all_routes = xdp_socket::util::get_ipv4_routes(None).unwrap();
    let gw = xdp_socket::util::find_default_gateway(&all_routes).unwrap();
    let neighbors = xdp_socket::util::get_neighbors(Some(gw.if_index)).unwrap();
    for n in neighbors {
        println!("Neighbor: {:#?}", n);
    }
}

#[test]
fn test_list_addresses() {
    let addr = xdp_socket::util::get_ipv4_address(None).unwrap();
    println!("Addresses: {:#?} ", addr);
}

#[test]
fn test_list_links() {
    let links = xdp_socket::util::get_links().unwrap();
    for link in links {
        println!("Link: {:#?}", link);
    }
}
