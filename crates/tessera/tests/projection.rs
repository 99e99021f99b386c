//! Result projection: dynamic templates end to end, nested result maps,
//! discriminators, constructor mappings, auto-mapping, lazy loading,
//! cursors and multi-result-set linking.

use tessera::testing::StubDriver;
use tessera::{SessionFactory, Value, ValueObject};
use tessera_core::meta::MetaValue;
use tessera_core::Configuration;
use tessera_sql::{MapperBuilder, MapperDocumentBuilder};

fn object(pairs: &[(&str, Value)]) -> Value {
    let mut map = ValueObject::new();
    for (name, value) in pairs {
        map.insert(name.to_string(), value.clone());
    }
    Value::Object(map)
}

fn factory(driver: &StubDriver, build: impl FnOnce(&mut Configuration)) -> SessionFactory {
    let mut config = tessera_sql::configuration();
    config.set_environment(driver.environment("test"));
    build(&mut config);
    config.resolve_pending().unwrap();
    SessionFactory::new(config)
}

fn parse_mapper(config: &mut Configuration, resource: &str, xml: &str) {
    MapperDocumentBuilder::new(resource)
        .parse(config, xml)
        .unwrap();
}

#[test]
fn where_with_ifs_builds_reduced_statement() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM u WHERE name = ?",
        &["name"],
        vec![vec![Value::String("ann".into())]],
    );
    let factory = factory(&driver, |config| {
        let mut mapper = MapperBuilder::new(config, "app.M");
        mapper
            .select("search")
            .script(
                "<script>SELECT * FROM u
                   <where>
                     <if test=\"name != null\">AND name = #{name}</if>
                     <if test=\"age &gt; 0\">AND age = #{age}</if>
                   </where></script>",
            )
            .result_type("map")
            .register()
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let rows = session
        .select_list(
            "app.M.search",
            object(&[
                ("name", Value::String("ann".into())),
                ("age", Value::Int(0)),
            ]),
        )
        .unwrap();

    assert_eq!(rows.len(), 1);
    let executed = driver.executed();
    assert_eq!(executed[0].sql, "SELECT * FROM u WHERE name = ?");
    assert_eq!(executed[0].parameters, vec![Value::String("ann".into())]);
}

#[test]
fn foreach_binds_each_element() {
    let driver = StubDriver::new();
    driver.on_update("DELETE FROM t WHERE id IN ( ? , ? , ? )", 3);
    let factory = factory(&driver, |config| {
        let mut mapper = MapperBuilder::new(config, "app.M");
        mapper
            .delete("wipe")
            .script(
                "<script>DELETE FROM t WHERE id IN
                   <foreach collection=\"ids\" item=\"i\" open=\"(\" close=\")\" separator=\",\">#{i}</foreach></script>",
            )
            .register()
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let mut parameter = object(&[(
        "ids",
        Value::List(vec![1i32.into(), 2i32.into(), 3i32.into()]),
    )]);
    let count = session.delete("app.M.wipe", &mut parameter).unwrap();

    assert_eq!(count, 3);
    let executed = driver.executed();
    assert_eq!(
        executed[0].parameters,
        vec![Value::Int(1), Value::Int(2), Value::Int(3)]
    );
}

const USER_ADDRESSES: &str = r#"
<mapper namespace="app.UserMapper">
  <resultMap id="userResult" type="map">
    <id property="id" column="u"/>
    <collection property="addresses" ofType="map">
      <id property="aid" column="a_id"/>
    </collection>
  </resultMap>
  <select id="withAddresses" resultMap="userResult">
    SELECT * FROM users JOIN addresses
  </select>
</mapper>
"#;

#[test]
fn nested_result_map_groups_joined_rows() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM users JOIN addresses",
        &["u", "a_id"],
        vec![
            vec![Value::Long(1), Value::Long(10)],
            vec![Value::Long(1), Value::Long(11)],
            vec![Value::Long(2), Value::Long(20)],
        ],
    );
    let factory = factory(&driver, |config| {
        parse_mapper(config, "user-mapper.xml", USER_ADDRESSES);
    });
    let mut session = factory.open().unwrap();

    let rows = session
        .select_list("app.UserMapper.withAddresses", Value::Null)
        .unwrap();

    assert_eq!(rows.len(), 2);

    let first = MetaValue::new(&rows[0]);
    assert_eq!(first.get("id").unwrap(), Value::Long(1));
    assert_eq!(first.get("addresses[0].aid").unwrap(), Value::Long(10));
    assert_eq!(first.get("addresses[1].aid").unwrap(), Value::Long(11));

    let second = MetaValue::new(&rows[1]);
    assert_eq!(second.get("id").unwrap(), Value::Long(2));
    assert_eq!(second.get("addresses[0].aid").unwrap(), Value::Long(20));
    assert_eq!(second.get("addresses[1]").unwrap(), Value::Null);
}

const DISCRIMINATED: &str = r#"
<mapper namespace="app.VehicleMapper">
  <resultMap id="vehicleResult" type="map">
    <id property="id" column="id"/>
    <result property="label" column="label"/>
    <discriminator column="kind" javaType="string">
      <case value="A">
        <result property="aOnly" column="a_only"/>
      </case>
      <case value="B">
        <result property="bOnly" column="b_only"/>
      </case>
    </discriminator>
  </resultMap>
  <select id="all" resultMap="vehicleResult">
    SELECT * FROM vehicles
  </select>
</mapper>
"#;

#[test]
fn discriminator_projects_case_specific_union() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM vehicles",
        &["id", "label", "kind", "a_only", "b_only"],
        vec![
            vec![
                Value::Long(1),
                Value::String("first".into()),
                Value::String("A".into()),
                Value::String("alpha".into()),
                Value::Null,
            ],
            vec![
                Value::Long(2),
                Value::String("second".into()),
                Value::String("B".into()),
                Value::Null,
                Value::String("beta".into()),
            ],
        ],
    );
    let factory = factory(&driver, |config| {
        parse_mapper(config, "vehicle-mapper.xml", DISCRIMINATED);
    });
    let mut session = factory.open().unwrap();

    let rows = session
        .select_list("app.VehicleMapper.all", Value::Null)
        .unwrap();

    // case A projects the parent columns plus its own
    assert_eq!(rows[0].property("id"), Some(Value::Long(1)));
    assert_eq!(rows[0].property("label"), Some(Value::String("first".into())));
    assert_eq!(rows[0].property("aOnly"), Some(Value::String("alpha".into())));
    assert_eq!(rows[0].property("bOnly"), None);

    assert_eq!(rows[1].property("bOnly"), Some(Value::String("beta".into())));
    assert_eq!(rows[1].property("aOnly"), None);
}

const CONSTRUCTED: &str = r#"
<mapper namespace="app.PointMapper">
  <resultMap id="pointResult" type="map" autoMapping="false">
    <constructor>
      <idArg name="x" column="x" javaType="long"/>
      <arg name="y" column="y" javaType="long"/>
    </constructor>
    <result property="label" column="label"/>
  </resultMap>
  <select id="all" resultMap="pointResult">
    SELECT * FROM points
  </select>
</mapper>
"#;

#[test]
fn constructor_mappings_feed_ordered_args() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM points",
        &["x", "y", "label"],
        vec![vec![
            Value::Long(3),
            Value::Long(4),
            Value::String("origin-ish".into()),
        ]],
    );
    let factory = factory(&driver, |config| {
        parse_mapper(config, "point-mapper.xml", CONSTRUCTED);
    });
    let mut session = factory.open().unwrap();

    let rows = session.select_list("app.PointMapper.all", Value::Null).unwrap();
    let point = rows[0].as_object().unwrap();

    // constructor args land first, in declaration order
    let keys: Vec<_> = point.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["x", "y", "label"]);
    assert_eq!(point.get("x"), Some(&Value::Long(3)));
}

#[test]
fn camel_case_auto_mapping() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM users",
        &["USER_ID", "USER_NAME"],
        vec![vec![Value::Long(1), Value::String("ann".into())]],
    );
    let factory = factory(&driver, |config| {
        config.settings_mut().map_underscore_to_camel_case = true;
        let mut mapper = MapperBuilder::new(config, "app.M");
        mapper
            .select("all")
            .script("SELECT * FROM users")
            .result_type("map")
            .register()
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let rows = session.select_list("app.M.all", Value::Null).unwrap();
    assert_eq!(rows[0].property("userId"), Some(Value::Long(1)));
    assert_eq!(rows[0].property("userName"), Some(Value::String("ann".into())));
}

const LAZY_BLOG: &str = r#"
<mapper namespace="app.BlogMapper">
  <resultMap id="blogResult" type="map">
    <id property="id" column="id"/>
    <result property="title" column="title"/>
    <association property="author" column="author_id" select="app.AuthorMapper.findById" fetchType="lazy"/>
  </resultMap>
  <select id="findById" resultMap="blogResult">
    SELECT * FROM blog WHERE id = #{id}
  </select>
</mapper>
"#;

const AUTHOR: &str = r#"
<mapper namespace="app.AuthorMapper">
  <select id="findById" resultType="map">
    SELECT * FROM author WHERE id = #{id}
  </select>
</mapper>
"#;

#[test]
fn lazy_association_loads_on_demand() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM blog WHERE id = ?",
        &["id", "title", "author_id"],
        vec![vec![
            Value::Long(1),
            Value::String("post".into()),
            Value::Long(9),
        ]],
    );
    driver.on_query(
        "SELECT * FROM author WHERE id = ?",
        &["id", "name"],
        vec![vec![Value::Long(9), Value::String("ann".into())]],
    );
    let factory = factory(&driver, |config| {
        config.settings_mut().lazy_loading_enabled = true;
        parse_mapper(config, "blog-mapper.xml", LAZY_BLOG);
        parse_mapper(config, "author-mapper.xml", AUTHOR);
    });
    let mut session = factory.open().unwrap();

    let blog = session
        .select_one("app.BlogMapper.findById", object(&[("id", Value::Long(1))]))
        .unwrap()
        .unwrap();

    // only the blog query has run
    assert_eq!(driver.executed().len(), 1);
    let Value::Proxy(proxy) = &blog else {
        panic!("lazy result should be proxied");
    };
    assert!(proxy.is_pending("author"));

    // comparison does not trip the loader
    assert_eq!(blog, blog.clone());
    assert_eq!(driver.executed().len(), 1);

    session.load_lazy(&blog, "author").unwrap();
    assert_eq!(driver.executed().len(), 2);
    assert_eq!(
        MetaValue::new(&blog).get("author.name").unwrap(),
        Value::String("ann".into())
    );
}

const LINKED: &str = r#"
<mapper namespace="app.OrderMapper">
  <resultMap id="lineResult" type="map">
    <id property="lid" column="lid"/>
    <result property="sku" column="sku"/>
  </resultMap>
  <resultMap id="orderResult" type="map">
    <id property="id" column="id"/>
    <result property="code" column="code"/>
    <collection property="lines" column="id" foreignColumn="order_id"
                resultSet="lines" ofType="map" resultMap="lineResult"/>
  </resultMap>
  <select id="withLines" resultMap="orderResult" resultSets="orders,lines">
    CALL load_orders()
  </select>
</mapper>
"#;

#[test]
fn multi_result_set_linking_fills_collections() {
    use tessera::testing::StubResultSet;

    let driver = StubDriver::new();
    driver.on_query_sets(
        "CALL load_orders()",
        vec![
            StubResultSet::new(
                &["id", "code"],
                vec![
                    vec![Value::Long(1), Value::String("A-1".into())],
                    vec![Value::Long(2), Value::String("A-2".into())],
                ],
            ),
            StubResultSet::new(
                &["lid", "sku", "order_id"],
                vec![
                    vec![Value::Long(10), Value::String("red".into()), Value::Long(1)],
                    vec![Value::Long(11), Value::String("blue".into()), Value::Long(1)],
                    vec![Value::Long(20), Value::String("green".into()), Value::Long(2)],
                ],
            ),
        ],
    );
    let factory = factory(&driver, |config| {
        parse_mapper(config, "order-mapper.xml", LINKED);
    });
    let mut session = factory.open().unwrap();

    let rows = session
        .select_list("app.OrderMapper.withLines", Value::Null)
        .unwrap();

    assert_eq!(rows.len(), 2);
    let first = MetaValue::new(&rows[0]);
    assert_eq!(first.get("lines[0].sku").unwrap(), Value::String("red".into()));
    assert_eq!(first.get("lines[1].sku").unwrap(), Value::String("blue".into()));
    let second = MetaValue::new(&rows[1]);
    assert_eq!(second.get("lines[0].sku").unwrap(), Value::String("green".into()));
}

#[test]
fn cursor_streams_rows_lazily() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM users",
        &["id"],
        (1..=3).map(|i| vec![Value::Long(i)]).collect(),
    );
    let factory = factory(&driver, |config| {
        let mut mapper = MapperBuilder::new(config, "app.M");
        mapper
            .select("all")
            .script("SELECT * FROM users")
            .result_type("map")
            .register()
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let mut cursor = session
        .select_cursor("app.M.all", Value::Null, tessera::RowBounds::DEFAULT)
        .unwrap();

    let mut ids = Vec::new();
    while let Some(row) = cursor.next_row() {
        ids.push(row.unwrap().property("id").unwrap());
    }
    assert_eq!(ids, vec![Value::Long(1), Value::Long(2), Value::Long(3)]);
    assert!(cursor.is_closed());
}

#[test]
fn scalar_result_type_projects_single_column() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT count(*) FROM users",
        &["count"],
        vec![vec![Value::Long(42)]],
    );
    let factory = factory(&driver, |config| {
        let mut mapper = MapperBuilder::new(config, "app.M");
        mapper
            .select("total")
            .script("SELECT count(*) FROM users")
            .result_type("long")
            .register()
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let total: Option<i64> = session.select_one_as("app.M.total", Value::Null).unwrap();
    assert_eq!(total, Some(42));
}
